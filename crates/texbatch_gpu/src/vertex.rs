//! Textured quad vertex layouts
//!
//! Eight GPU vertex structs, one per combination of position dimension,
//! domain clamp and coverage AA. All structures use `#[repr(C)]` and
//! implement `bytemuck::Pod` so a batch's vertex memory can be filled as a
//! typed slice and uploaded verbatim.
//!
//! Attribute order is always position, color, texture coordinates, then the
//! optional domain rect and the optional four edge equations.

use std::mem::size_of;

/// One of the eight vertex shapes (must match shader variants).
///
/// The discriminant packs the requirements as
/// `coverage_aa | domain << 1 | perspective << 2`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    #[default]
    Position2d = 0,
    Position2dAa = 1,
    Position2dDomain = 2,
    Position2dDomainAa = 3,
    Position3d = 4,
    Position3dAa = 5,
    Position3dDomain = 6,
    Position3dDomainAa = 7,
}

impl VertexLayout {
    /// Every layout, in discriminant order
    pub const ALL: [VertexLayout; 8] = [
        VertexLayout::Position2d,
        VertexLayout::Position2dAa,
        VertexLayout::Position2dDomain,
        VertexLayout::Position2dDomainAa,
        VertexLayout::Position3d,
        VertexLayout::Position3dAa,
        VertexLayout::Position3dDomain,
        VertexLayout::Position3dDomainAa,
    ];

    /// Pick the layout for an aggregate set of batch requirements
    pub const fn from_requirements(coverage_aa: bool, domain: bool, perspective: bool) -> Self {
        let index = (coverage_aa as usize) | (domain as usize) << 1 | (perspective as usize) << 2;
        Self::ALL[index]
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn has_coverage_aa(self) -> bool {
        self.index() & 1 != 0
    }

    pub const fn has_domain(self) -> bool {
        self.index() & 2 != 0
    }

    pub const fn has_perspective(self) -> bool {
        self.index() & 4 != 0
    }

    /// Bytes per vertex
    pub const fn stride(self) -> usize {
        match self {
            VertexLayout::Position2d => size_of::<Position2dVertex>(),
            VertexLayout::Position2dAa => size_of::<Position2dAaVertex>(),
            VertexLayout::Position2dDomain => size_of::<Position2dDomainVertex>(),
            VertexLayout::Position2dDomainAa => size_of::<Position2dDomainAaVertex>(),
            VertexLayout::Position3d => size_of::<Position3dVertex>(),
            VertexLayout::Position3dAa => size_of::<Position3dAaVertex>(),
            VertexLayout::Position3dDomain => size_of::<Position3dDomainVertex>(),
            VertexLayout::Position3dDomainAa => size_of::<Position3dDomainAaVertex>(),
        }
    }

    /// Vertex buffer description for a wgpu render pipeline
    pub fn buffer_layout(self) -> wgpu::VertexBufferLayout<'static> {
        let attributes: &'static [wgpu::VertexAttribute] = match self {
            VertexLayout::Position2d => &ATTRS_2D,
            VertexLayout::Position2dAa => &ATTRS_2D_AA,
            VertexLayout::Position2dDomain => &ATTRS_2D_DOMAIN,
            VertexLayout::Position2dDomainAa => &ATTRS_2D_DOMAIN_AA,
            VertexLayout::Position3d => &ATTRS_3D,
            VertexLayout::Position3dAa => &ATTRS_3D_AA,
            VertexLayout::Position3dDomain => &ATTRS_3D_DOMAIN,
            VertexLayout::Position3dDomainAa => &ATTRS_3D_DOMAIN_AA,
        };
        wgpu::VertexBufferLayout {
            array_stride: self.stride() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attribute tables
// ─────────────────────────────────────────────────────────────────────────────

const ATTRS_2D: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Unorm8x4,
    2 => Float32x2,
];

const ATTRS_2D_AA: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Unorm8x4,
    2 => Float32x2,
    3 => Float32x3,
    4 => Float32x3,
    5 => Float32x3,
    6 => Float32x3,
];

const ATTRS_2D_DOMAIN: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Unorm8x4,
    2 => Float32x2,
    3 => Float32x4,
];

const ATTRS_2D_DOMAIN_AA: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Unorm8x4,
    2 => Float32x2,
    3 => Float32x4,
    4 => Float32x3,
    5 => Float32x3,
    6 => Float32x3,
    7 => Float32x3,
];

const ATTRS_3D: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Unorm8x4,
    2 => Float32x2,
];

const ATTRS_3D_AA: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Unorm8x4,
    2 => Float32x2,
    3 => Float32x3,
    4 => Float32x3,
    5 => Float32x3,
    6 => Float32x3,
];

const ATTRS_3D_DOMAIN: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Unorm8x4,
    2 => Float32x2,
    3 => Float32x4,
];

const ATTRS_3D_DOMAIN_AA: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Unorm8x4,
    2 => Float32x2,
    3 => Float32x4,
    4 => Float32x3,
    5 => Float32x3,
    6 => Float32x3,
    7 => Float32x3,
];

// ─────────────────────────────────────────────────────────────────────────────
// Vertex structs
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a vertex of any layout can carry; each layout keeps a subset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexAttributes {
    /// Homogeneous device position
    pub position: [f32; 3],
    /// Premultiplied RGBA8
    pub color: [u8; 4],
    /// Normalized texture coordinates
    pub tex_coords: [f32; 2],
    /// Normalized clamp rect (left, top, right, bottom)
    pub domain: [f32; 4],
    /// Edge equations (a, b, c) in edge order
    pub edges: [[f32; 3]; 4],
}

/// A vertex struct that can be assembled from [`VertexAttributes`]
pub trait TexturedVertex: bytemuck::Pod {
    const LAYOUT: VertexLayout;

    fn assemble(attrs: &VertexAttributes) -> Self;
}

macro_rules! textured_vertex {
    (
        $(#[$meta:meta])*
        $name:ident as $layout:ident ($attrs:ident) {
            $($field:ident: $ty:ty = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
        pub struct $name {
            $(pub $field: $ty),+
        }

        impl TexturedVertex for $name {
            const LAYOUT: VertexLayout = VertexLayout::$layout;

            fn assemble($attrs: &VertexAttributes) -> Self {
                Self { $($field: $value),+ }
            }
        }
    };
}

textured_vertex! {
    /// 20 bytes: position(8) color(4) tex_coords(8)
    Position2dVertex as Position2d (a) {
        position: [f32; 2] = [a.position[0], a.position[1]],
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
    }
}

textured_vertex! {
    /// 68 bytes: position(8) color(4) tex_coords(8) edges(48)
    Position2dAaVertex as Position2dAa (a) {
        position: [f32; 2] = [a.position[0], a.position[1]],
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
        edges: [[f32; 3]; 4] = a.edges,
    }
}

textured_vertex! {
    /// 36 bytes: position(8) color(4) tex_coords(8) domain(16)
    Position2dDomainVertex as Position2dDomain (a) {
        position: [f32; 2] = [a.position[0], a.position[1]],
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
        domain: [f32; 4] = a.domain,
    }
}

textured_vertex! {
    /// 84 bytes: position(8) color(4) tex_coords(8) domain(16) edges(48)
    Position2dDomainAaVertex as Position2dDomainAa (a) {
        position: [f32; 2] = [a.position[0], a.position[1]],
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
        domain: [f32; 4] = a.domain,
        edges: [[f32; 3]; 4] = a.edges,
    }
}

textured_vertex! {
    /// 24 bytes: position(12) color(4) tex_coords(8)
    Position3dVertex as Position3d (a) {
        position: [f32; 3] = a.position,
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
    }
}

textured_vertex! {
    /// 72 bytes: position(12) color(4) tex_coords(8) edges(48)
    Position3dAaVertex as Position3dAa (a) {
        position: [f32; 3] = a.position,
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
        edges: [[f32; 3]; 4] = a.edges,
    }
}

textured_vertex! {
    /// 40 bytes: position(12) color(4) tex_coords(8) domain(16)
    Position3dDomainVertex as Position3dDomain (a) {
        position: [f32; 3] = a.position,
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
        domain: [f32; 4] = a.domain,
    }
}

textured_vertex! {
    /// 88 bytes: position(12) color(4) tex_coords(8) domain(16) edges(48)
    Position3dDomainAaVertex as Position3dDomainAa (a) {
        position: [f32; 3] = a.position,
        color: [u8; 4] = a.color,
        tex_coords: [f32; 2] = a.tex_coords,
        domain: [f32; 4] = a.domain,
        edges: [[f32; 3]; 4] = a.edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_index_roundtrip() {
        for (i, layout) in VertexLayout::ALL.iter().enumerate() {
            assert_eq!(layout.index(), i);
            let back = VertexLayout::from_requirements(
                layout.has_coverage_aa(),
                layout.has_domain(),
                layout.has_perspective(),
            );
            assert_eq!(back, *layout);
        }
    }

    #[test]
    fn test_strides() {
        assert_eq!(VertexLayout::Position2d.stride(), 20);
        assert_eq!(VertexLayout::Position2dAa.stride(), 68);
        assert_eq!(VertexLayout::Position2dDomain.stride(), 36);
        assert_eq!(VertexLayout::Position2dDomainAa.stride(), 84);
        assert_eq!(VertexLayout::Position3d.stride(), 24);
        assert_eq!(VertexLayout::Position3dAa.stride(), 72);
        assert_eq!(VertexLayout::Position3dDomain.stride(), 40);
        assert_eq!(VertexLayout::Position3dDomainAa.stride(), 88);
    }

    #[test]
    fn test_buffer_layout_covers_stride() {
        for layout in VertexLayout::ALL {
            let desc = layout.buffer_layout();
            assert_eq!(desc.array_stride as usize, layout.stride());
            let last = desc.attributes.last().unwrap();
            assert_eq!(last.offset + last.format.size(), desc.array_stride);
        }
    }

    #[test]
    fn test_assemble_keeps_subset() {
        let attrs = VertexAttributes {
            position: [1.0, 2.0, 3.0],
            color: [10, 20, 30, 40],
            tex_coords: [0.25, 0.75],
            domain: [0.0, 0.0, 1.0, 1.0],
            edges: [[1.0, 0.0, 0.5]; 4],
        };
        let v = Position2dDomainVertex::assemble(&attrs);
        assert_eq!(v.position, [1.0, 2.0]);
        assert_eq!(v.domain, [0.0, 0.0, 1.0, 1.0]);

        let v = Position3dAaVertex::assemble(&attrs);
        assert_eq!(v.position, [1.0, 2.0, 3.0]);
        assert_eq!(v.edges[3], [1.0, 0.0, 0.5]);
        assert_eq!(bytemuck::bytes_of(&v).len(), 72);
    }
}
