//! Flush targets
//!
//! A [`FlushTarget`] owns GPU-visible vertex memory and receives finished
//! draw submissions. [`RecordingTarget`] is a CPU implementation that keeps
//! vertices in a byte arena, records every submission and can upload the
//! result into wgpu buffers.

use wgpu::util::DeviceExt;

use crate::error::{FlushError, Result};
use crate::tessellate::GeometryDescription;
use crate::texture::ProxyRef;

/// Index pattern drawing one quad from four tri-strip ordered vertices
pub const QUAD_INDEX_PATTERN: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Most quads a u16 index buffer can address
pub const MAX_INDEXED_QUADS: u32 = (u16::MAX as u32 + 1) / 4;

/// A region of vertex memory handed out by a flush target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAllocation {
    /// Byte offset into the target's vertex memory
    pub offset: usize,
    pub stride: usize,
    pub vertex_count: usize,
}

impl VertexAllocation {
    pub fn byte_len(&self) -> usize {
        self.stride * self.vertex_count
    }
}

/// Shared quad index buffer description
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadIndexBuffer {
    /// Quads covered by one repetition of the index buffer
    pub max_quads: u32,
}

impl QuadIndexBuffer {
    /// The expanded u16 index data for `max_quads` quads, at most
    /// [`MAX_INDEXED_QUADS`]
    pub fn indices(&self) -> Vec<u16> {
        let quads = self.max_quads.min(MAX_INDEXED_QUADS) as u16;
        (0..quads)
            .flat_map(|quad| QUAD_INDEX_PATTERN.map(|i| quad * 4 + i))
            .collect()
    }
}

/// One draw within a submission
#[derive(Clone, Debug, PartialEq)]
pub enum Mesh {
    /// A single quad as a four-vertex strip
    TriangleStrip { vertex_offset: usize, vertex_count: u32 },
    /// Many quads as triangles, indexed by the repeating quad pattern
    IndexedPatterned {
        vertex_offset: usize,
        quad_count: u32,
        indices_per_quad: u32,
        vertices_per_quad: u32,
        max_quads_per_draw: u32,
    },
}

impl Mesh {
    pub fn quad_patterned(vertex_offset: usize, quad_count: u32, max_quads_per_draw: u32) -> Self {
        Mesh::IndexedPatterned {
            vertex_offset,
            quad_count,
            indices_per_quad: QUAD_INDEX_PATTERN.len() as u32,
            vertices_per_quad: 4,
            max_quads_per_draw,
        }
    }

    /// Byte offset of the mesh's first vertex
    pub fn vertex_offset(&self) -> usize {
        match *self {
            Mesh::TriangleStrip { vertex_offset, .. } | Mesh::IndexedPatterned { vertex_offset, .. } => {
                vertex_offset
            }
        }
    }

    pub fn quad_count(&self) -> u32 {
        match *self {
            Mesh::TriangleStrip { .. } => 1,
            Mesh::IndexedPatterned { quad_count, .. } => quad_count,
        }
    }

    /// Indexed draws needed when the pattern repeats fewer quads than the mesh has
    pub fn draw_count(&self) -> u32 {
        match *self {
            Mesh::TriangleStrip { .. } => 1,
            Mesh::IndexedPatterned {
                quad_count,
                max_quads_per_draw,
                ..
            } => quad_count.div_ceil(max_quads_per_draw.max(1)),
        }
    }
}

/// How a submission's meshes find their texture
#[derive(Clone, Debug)]
pub enum TextureBindings {
    /// Every mesh samples the same texture
    Fixed(ProxyRef),
    /// One texture per mesh, in mesh order
    PerMesh(Vec<ProxyRef>),
}

impl TextureBindings {
    pub fn texture_count(&self) -> usize {
        match self {
            TextureBindings::Fixed(_) => 1,
            TextureBindings::PerMesh(proxies) => proxies.len(),
        }
    }
}

/// Fixed-function pipeline state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineDesc {
    /// Multisampling resolves edge coverage
    pub hw_antialias: bool,
}

impl PipelineDesc {
    pub fn multisample_state(&self, sample_count: u32) -> wgpu::MultisampleState {
        wgpu::MultisampleState {
            count: if self.hw_antialias { sample_count } else { 1 },
            mask: !0,
            alpha_to_coverage_enabled: false,
        }
    }
}

/// Everything needed to issue one batched draw
#[derive(Clone, Debug)]
pub struct DrawSubmission {
    pub geometry: GeometryDescription,
    pub pipeline: PipelineDesc,
    pub textures: TextureBindings,
    pub meshes: Vec<Mesh>,
}

impl DrawSubmission {
    pub fn quad_count(&self) -> u32 {
        self.meshes.iter().map(Mesh::quad_count).sum()
    }
}

/// Counters accumulated over a flush
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub draws: usize,
    pub meshes: usize,
    pub quads: usize,
    /// Batches dropped because a resource could not be acquired
    pub skipped_batches: usize,
}

impl std::ops::AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.draws += other.draws;
        self.meshes += other.meshes;
        self.quads += other.quads;
        self.skipped_batches += other.skipped_batches;
    }
}

/// Destination of a flush
pub trait FlushTarget {
    /// Reserve room for `vertex_count` vertices of `stride` bytes
    fn allocate_vertices(&mut self, stride: usize, vertex_count: usize) -> Result<VertexAllocation>;

    /// Writable bytes of an allocation
    fn vertices_mut(&mut self, allocation: &VertexAllocation) -> &mut [u8];

    /// The shared quad index buffer
    fn quad_index_buffer(&mut self) -> Result<QuadIndexBuffer>;

    fn draw(&mut self, submission: DrawSubmission);
}

/// CPU flush target recording submissions and vertex bytes
#[derive(Debug)]
pub struct RecordingTarget {
    vertex_data: Vec<u8>,
    vertex_budget: Option<usize>,
    max_quads_per_draw: u32,
    index_buffer_available: bool,
    submissions: Vec<DrawSubmission>,
}

impl RecordingTarget {
    pub fn new(max_quads_per_draw: u32) -> Self {
        Self {
            vertex_data: Vec::new(),
            vertex_budget: None,
            max_quads_per_draw: max_quads_per_draw.clamp(1, MAX_INDEXED_QUADS),
            index_buffer_available: true,
            submissions: Vec::new(),
        }
    }

    /// Refuse vertex allocations once `bytes` are in use
    pub fn with_vertex_budget(mut self, bytes: usize) -> Self {
        self.vertex_budget = Some(bytes);
        self
    }

    /// Make the quad index buffer unavailable
    pub fn without_index_buffer(mut self) -> Self {
        self.index_buffer_available = false;
        self
    }

    pub fn submissions(&self) -> &[DrawSubmission] {
        &self.submissions
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertex_data
    }

    /// Read back vertex `index` of `stride`-sized vertices starting at `offset`
    pub fn read_vertex<V: bytemuck::Pod>(&self, offset: usize, index: usize) -> Option<V> {
        let size = std::mem::size_of::<V>();
        let start = offset + index * size;
        self.vertex_data
            .get(start..start + size)
            .map(bytemuck::pod_read_unaligned)
    }

    /// Copy the recorded vertices into a GPU vertex buffer
    pub fn upload_vertices(&self, device: &wgpu::Device) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texbatch vertices"),
            contents: &self.vertex_data,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        })
    }

    /// Build the shared quad index buffer on the GPU
    pub fn upload_quad_indices(&self, device: &wgpu::Device) -> wgpu::Buffer {
        let indices = QuadIndexBuffer {
            max_quads: self.max_quads_per_draw,
        }
        .indices();
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texbatch quad indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        })
    }

    /// Drop recorded vertices and submissions, keeping capacity
    pub fn reset(&mut self) {
        self.vertex_data.clear();
        self.submissions.clear();
    }
}

impl FlushTarget for RecordingTarget {
    fn allocate_vertices(&mut self, stride: usize, vertex_count: usize) -> Result<VertexAllocation> {
        let offset = self.vertex_data.len();
        let bytes = stride * vertex_count;
        if let Some(budget) = self.vertex_budget {
            if offset + bytes > budget {
                return Err(FlushError::VertexAllocation { stride, vertex_count });
            }
        }
        self.vertex_data.resize(offset + bytes, 0);
        Ok(VertexAllocation {
            offset,
            stride,
            vertex_count,
        })
    }

    fn vertices_mut(&mut self, allocation: &VertexAllocation) -> &mut [u8] {
        &mut self.vertex_data[allocation.offset..allocation.offset + allocation.byte_len()]
    }

    fn quad_index_buffer(&mut self) -> Result<QuadIndexBuffer> {
        if !self.index_buffer_available {
            return Err(FlushError::IndexBufferUnavailable);
        }
        Ok(QuadIndexBuffer {
            max_quads: self.max_quads_per_draw,
        })
    }

    fn draw(&mut self, submission: DrawSubmission) {
        tracing::trace!(
            "recorded draw: {} meshes, {} quads, layout {:?}",
            submission.meshes.len(),
            submission.quad_count(),
            submission.geometry.layout
        );
        self.submissions.push(submission);
    }
}
