//! Pipeline collaborator traits
//!
//! The pipeline is written against two capabilities it does not own: a way to
//! fetch the raw bytes of a file, and a PDF decoder that can rasterize pages.

use async_trait::async_trait;
use image::RgbImage;

use super::error::RenderResult;
use super::types::DocId;

/// Source of raw PDF bytes for an identifier
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the complete file content
    async fn fetch_bytes(&self, id: &DocId) -> RenderResult<Vec<u8>>;
}

/// PDF decoder capability
///
/// Implementations are CPU-bound and are always called from the blocking pool.
pub trait PdfDecoder: Send + Sync {
    /// Decode raw bytes into a document handle
    fn open(&self, bytes: Vec<u8>) -> RenderResult<Box<dyn DecodedDocument>>;
}

/// A decoded document, used for one decode-and-render pass
///
/// Not safe for concurrent use: pages are rasterized one at a time.
pub trait DecodedDocument: Send {
    /// Number of pages
    fn page_count(&self) -> usize;

    /// Rasterize a page (0-based index) at the given scale
    fn render_page(&mut self, index: usize, scale: f32) -> RenderResult<RgbImage>;
}
