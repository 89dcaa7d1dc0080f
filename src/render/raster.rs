//! Blocking decode and rasterize steps
//!
//! Decoding and rasterizing are CPU-bound, so each step runs on the blocking
//! pool under a timeout. Every step is a suspension point for the caller.

use std::sync::Arc;

use tokio::time::{timeout, Duration};

use super::encode::encode_jpeg;
use super::error::{RenderError, RenderResult};
use super::traits::{DecodedDocument, PdfDecoder};
use super::types::RenderedImage;

/// Scale, quality and time budget for one kind of render
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterSettings {
    /// Rasterization scale (1.0 = 72 dpi)
    pub scale: f32,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Budget for each blocking step
    pub timeout_secs: u64,
}

async fn run_blocking<T, F>(timeout_secs: u64, work: F) -> RenderResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> RenderResult<T> + Send + 'static,
{
    match timeout(
        Duration::from_secs(timeout_secs),
        tokio::task::spawn_blocking(work),
    )
    .await
    {
        Ok(join_result) => join_result.map_err(|e| RenderError::Join(e.to_string()))?,
        Err(_) => Err(RenderError::Timeout(timeout_secs)),
    }
}

/// Decode source bytes, rejecting documents without pages
pub(crate) async fn decode(
    decoder: Arc<dyn PdfDecoder>,
    bytes: Vec<u8>,
    timeout_secs: u64,
) -> RenderResult<Box<dyn DecodedDocument>> {
    run_blocking(timeout_secs, move || {
        let doc = decoder.open(bytes)?;
        if doc.page_count() == 0 {
            return Err(RenderError::EmptyDocument);
        }
        Ok(doc)
    })
    .await
}

/// Rasterize and encode one page, handing the document back for the next one
pub(crate) async fn render_page(
    mut doc: Box<dyn DecodedDocument>,
    index: usize,
    settings: RasterSettings,
) -> RenderResult<(Box<dyn DecodedDocument>, RenderedImage)> {
    run_blocking(settings.timeout_secs, move || {
        let raster = doc.render_page(index, settings.scale)?;
        let image = encode_jpeg(&raster, settings.quality)?;
        Ok((doc, image))
    })
    .await
}
