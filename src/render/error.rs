//! Render pipeline error types
//!
//! Fetch, decode and rasterize failures all flow through [`RenderError`].
//! The thumbnail orchestrator logs and swallows them; the viewer surfaces them.

use thiserror::Error;

/// Unified render error type
#[derive(Debug, Error)]
pub enum RenderError {
    /// Source bytes could not be fetched (transport error or non-2xx status)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Bytes are not a readable PDF
    #[error("Decode error: {0}")]
    Decode(String),

    /// Decoder failed while rasterizing a page (1-based page number)
    #[error("Rasterize error on page {page}: {reason}")]
    Rasterize { page: usize, reason: String },

    /// Encoding the raster to JPEG failed
    #[error("Image error: {0}")]
    ImageError(String),

    /// Decoded document reports zero pages
    #[error("Document has no pages")]
    EmptyDocument,

    /// Blocking decode/rasterize step exceeded its budget
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Viewer has no document to act on
    #[error("No document open")]
    NoDocument,

    /// Superseded by a newer open or closed before completion
    #[error("Render cancelled")]
    Cancelled,

    /// Blocking task panicked or was aborted
    #[error("Task join error: {0}")]
    Join(String),
}

impl RenderError {
    /// Whether this error came from cancellation rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }
}

/// Result type alias for render operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;
