//! Flush error types

use thiserror::Error;

use crate::texture::ProxyId;

/// Resource failures raised while preparing a batch for submission.
///
/// None of these abort a flush: the batch that hit one is skipped and the
/// remaining batches proceed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// The texture backing a proxy could not be created
    #[error("Failed to instantiate texture proxy {0}")]
    InstantiateFailed(ProxyId),

    /// No GPU-visible memory for the batch's vertices
    #[error("Could not allocate {vertex_count} vertices of {stride} bytes")]
    VertexAllocation { stride: usize, vertex_count: usize },

    /// The shared quad index buffer is unavailable
    #[error("Could not allocate quad indices")]
    IndexBufferUnavailable,
}

/// Result type for flush operations
pub type Result<T> = std::result::Result<T, FlushError>;
