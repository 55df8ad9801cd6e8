//! Quad tessellation and vertex layout dispatch
//!
//! A flush batch resolves its [`VertexLayout`] once from the union of its
//! ops' requirements. [`LAYOUT_TABLE`] then supplies the stride and the
//! monomorphized routine that writes four vertices per draw entry.

use std::mem::size_of;
use std::sync::Arc;

use texbatch_core::ColorSpaceXform;

use crate::domain::{compute_domain, normalized_tex_rect, NO_DOMAIN};
use crate::edge_aa::{compute_edge_equations, outset_corners, outset_perspective, EdgeEquations, QuadVertices};
use crate::op::DrawEntry;
use crate::texture::{Filter, SurfaceOrigin, TextureType};
use crate::vertex::{
    Position2dAaVertex, Position2dDomainAaVertex, Position2dDomainVertex, Position2dVertex,
    Position3dAaVertex, Position3dDomainAaVertex, Position3dDomainVertex, Position3dVertex,
    TexturedVertex, VertexAttributes, VertexLayout,
};

/// Per-texture state shared by every quad of one proxy group
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TessellationParams {
    pub filter: Filter,
    pub origin: SurfaceOrigin,
    /// Texture dimensions in texels
    pub texture_size: (u32, u32),
}

/// Writes `entries.len() * 4` vertices into `out`
pub type TessFn = fn(out: &mut [u8], entries: &[DrawEntry], params: &TessellationParams);

/// `(vertex stride, tessellate function)` indexed by [`VertexLayout::index`]
pub const LAYOUT_TABLE: [(usize, TessFn); 8] = [
    (size_of::<Position2dVertex>(), tessellate_entries::<Position2dVertex> as TessFn),
    (size_of::<Position2dAaVertex>(), tessellate_entries::<Position2dAaVertex> as TessFn),
    (size_of::<Position2dDomainVertex>(), tessellate_entries::<Position2dDomainVertex> as TessFn),
    (size_of::<Position2dDomainAaVertex>(), tessellate_entries::<Position2dDomainAaVertex> as TessFn),
    (size_of::<Position3dVertex>(), tessellate_entries::<Position3dVertex> as TessFn),
    (size_of::<Position3dAaVertex>(), tessellate_entries::<Position3dAaVertex> as TessFn),
    (size_of::<Position3dDomainVertex>(), tessellate_entries::<Position3dDomainVertex> as TessFn),
    (size_of::<Position3dDomainAaVertex>(), tessellate_entries::<Position3dDomainAaVertex> as TessFn),
];

/// Build the four vertices of one draw entry in layout `V`.
///
/// Without coverage AA the device corners and normalized source corners pass
/// through unchanged. With coverage AA the edge equations are computed and
/// the corners are pushed out half a pixel along every AA edge.
pub fn tessellate_quad<V: TexturedVertex>(entry: &DrawEntry, params: &TessellationParams) -> [V; 4] {
    let layout = V::LAYOUT;
    let quad = entry.quad();
    let flags = entry.aa_flags();
    let tex = normalized_tex_rect(entry.src_rect(), params.origin, params.texture_size);
    let mut corners = QuadVertices {
        x: quad.xs(),
        y: quad.ys(),
        w: quad.ws(),
        u: [tex[0], tex[0], tex[2], tex[2]],
        v: [tex[1], tex[3], tex[1], tex[3]],
    };

    let edges = if !layout.has_coverage_aa() {
        // Non-AA draws carry no flags; MSAA draws carry all of them.
        debug_assert!(flags.is_empty() || flags.is_all());
        EdgeEquations::INERT
    } else if layout.has_perspective() {
        if quad.is_2d() && flags.is_empty() {
            EdgeEquations::INERT
        } else {
            let iw = quad.iws();
            let x2d = [0, 1, 2, 3].map(|i| corners.x[i] * iw[i]);
            let y2d = [0, 1, 2, 3].map(|i| corners.y[i] * iw[i]);
            let edges = compute_edge_equations(flags, &x2d, &y2d);
            outset_perspective(flags, &mut corners);
            edges
        }
    } else {
        debug_assert!(quad.is_2d(), "2D layout used for a perspective quad");
        if flags.is_empty() {
            EdgeEquations::INERT
        } else {
            let edges = compute_edge_equations(flags, &corners.x, &corners.y);
            outset_corners(flags, &mut corners);
            edges
        }
    };

    let domain = if layout.has_domain() {
        compute_domain(
            entry.has_domain(),
            params.filter,
            entry.src_rect(),
            params.origin,
            params.texture_size,
        )
    } else {
        NO_DOMAIN
    };
    let color = entry.color().to_bytes();
    let edges = edges.to_attributes();

    [0, 1, 2, 3].map(|i| {
        V::assemble(&VertexAttributes {
            position: [corners.x[i], corners.y[i], corners.w[i]],
            color,
            tex_coords: [corners.u[i], corners.v[i]],
            domain,
            edges,
        })
    })
}

fn tessellate_entries<V: TexturedVertex>(out: &mut [u8], entries: &[DrawEntry], params: &TessellationParams) {
    let quad_bytes = size_of::<V>() * 4;
    debug_assert!(out.len() >= entries.len() * quad_bytes);
    for (entry, dst) in entries.iter().zip(out.chunks_exact_mut(quad_bytes)) {
        let vertices = tessellate_quad::<V>(entry, params);
        dst.copy_from_slice(bytemuck::cast_slice(&vertices));
    }
}

/// Aggregate requirements of a flush batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchRequirements {
    pub coverage_aa: bool,
    pub domain: bool,
    pub perspective: bool,
}

/// Layout and tessellation routine resolved once for a whole batch
#[derive(Clone, Copy)]
pub struct VariantDispatcher {
    layout: VertexLayout,
    stride: usize,
    tessellate: TessFn,
}

impl VariantDispatcher {
    pub fn resolve(requirements: BatchRequirements) -> Self {
        let layout = VertexLayout::from_requirements(
            requirements.coverage_aa,
            requirements.domain,
            requirements.perspective,
        );
        let (stride, tessellate) = LAYOUT_TABLE[layout.index()];
        debug_assert_eq!(stride, layout.stride());
        tracing::debug!("resolved vertex layout {:?} ({} bytes/vertex)", layout, stride);
        Self {
            layout,
            stride,
            tessellate,
        }
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Fill `out` with the vertices of `entries`
    pub fn tessellate(&self, out: &mut [u8], entries: &[DrawEntry], params: &TessellationParams) {
        (self.tessellate)(out, entries, params)
    }
}

impl std::fmt::Debug for VariantDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantDispatcher")
            .field("layout", &self.layout)
            .field("stride", &self.stride)
            .finish()
    }
}

/// Shader-facing description of a batch's geometry
#[derive(Clone, Debug)]
pub struct GeometryDescription {
    pub layout: VertexLayout,
    pub texture_type: TextureType,
    pub format: wgpu::TextureFormat,
    pub filter: Filter,
    pub texture_xform: Option<Arc<ColorSpaceXform>>,
    pub paint_xform: Option<Arc<ColorSpaceXform>>,
}

impl GeometryDescription {
    /// Pipeline cache key: layout, filter and texture type bits plus one key
    /// per color-space transform
    pub fn key(&self) -> [u32; 3] {
        let texture_type = match self.texture_type {
            TextureType::D2 => 0u32,
            TextureType::Rectangle => 1,
            TextureType::External => 2,
        };
        [
            self.layout.index() as u32 | (self.filter as u32) << 3 | texture_type << 5,
            ColorSpaceXform::key(self.texture_xform.as_deref()),
            ColorSpaceXform::key(self.paint_xform.as_deref()),
        ]
    }
}
