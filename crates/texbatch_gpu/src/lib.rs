//! texbatch GPU batching
//!
//! Turns textured-quad draw requests into as few GPU draws as possible:
//!
//! - **Draw ops**: [`TextureDrawOp`] collects quads per texture and merges or
//!   chains with neighbouring ops
//! - **Edge AA**: analytic per-edge coverage ramps with corner outsetting,
//!   including perspective-correct outsets
//! - **Domain clamp**: keeps bilinear taps inside a source rect
//! - **Vertex layouts**: eight `bytemuck::Pod` layouts, picked once per batch
//! - **Flush**: [`DrawOpList`] finalizes, tessellates and submits chains to a
//!   [`FlushTarget`]
//!
//! # Example
//!
//! ```rust
//! use texbatch_core::{QuadAaFlags, Rect};
//! use texbatch_gpu::{
//!     DrawOpList, DrawParams, LazyTextureProxy, RecordingTarget, SrcRectConstraint, TextureDrawOp,
//! };
//!
//! let (_, texture) = LazyTextureProxy::new(64, 64).shared();
//! let mut list = DrawOpList::default();
//! for x in [0.0, 32.0] {
//!     list.record(TextureDrawOp::single(
//!         texture.clone(),
//!         Rect::new(0.0, 0.0, 32.0, 32.0),
//!         Rect::new(x, 0.0, 32.0, 32.0),
//!         QuadAaFlags::NONE,
//!         SrcRectConstraint::Fast,
//!         &DrawParams::new(),
//!     ));
//! }
//!
//! let mut target = RecordingTarget::new(list.config().max_quads_per_draw);
//! let stats = list.flush(&mut target);
//! assert_eq!(stats.draws, 1);
//! assert_eq!(stats.quads, 2);
//! ```

pub mod config;
pub mod domain;
pub mod edge_aa;
pub mod error;
pub mod op;
pub mod op_list;
pub mod target;
pub mod tessellate;
pub mod texture;
pub mod vertex;

pub use config::{BatchConfig, Caps};
pub use domain::{compute_domain, NO_DOMAIN};
pub use edge_aa::{compute_edge_equations, outset_corners, outset_perspective, EdgeEquations, QuadVertices};
pub use error::{FlushError, Result};
pub use op::{
    AaType, CombineResult, DrawEntry, DrawParams, OpState, ProxyGroup, SrcRectConstraint, TextureDrawOp,
    TextureSetEntry,
};
pub use op_list::{DrawOpId, DrawOpList, RecordOutcome};
pub use target::{
    DrawSubmission, FlushStats, FlushTarget, Mesh, PipelineDesc, QuadIndexBuffer, RecordingTarget, TextureBindings,
    VertexAllocation, MAX_INDEXED_QUADS,
};
pub use tessellate::{
    tessellate_quad, BatchRequirements, GeometryDescription, TessFn, TessellationParams, VariantDispatcher,
    LAYOUT_TABLE,
};
pub use texture::{Filter, LazyTextureProxy, ProxyId, ProxyRef, SurfaceOrigin, TextureProxy, TextureType};
pub use vertex::{TexturedVertex, VertexAttributes, VertexLayout};
