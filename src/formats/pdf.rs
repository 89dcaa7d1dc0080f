//! MuPDF-backed PDF decoder
//!
//! MuPDF documents are not thread-safe, so a [`MupdfDocument`] only keeps the
//! source bytes and opens a fresh document for every page it rasterizes.

use std::sync::Arc;

use image::RgbImage;
use mupdf::{Colorspace, Document, Matrix};

use crate::render::{DecodedDocument, PdfDecoder, RenderError, RenderResult};

const PDF_MIME: &str = "application/pdf";

/// Largest accepted rasterization scale
const MAX_SCALE: f32 = 8.0;

/// Decoder that opens PDFs with MuPDF
#[derive(Debug, Clone, Copy, Default)]
pub struct MupdfDecoder;

impl MupdfDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PdfDecoder for MupdfDecoder {
    fn open(&self, bytes: Vec<u8>) -> RenderResult<Box<dyn DecodedDocument>> {
        Ok(Box::new(MupdfDocument::from_bytes(bytes)?))
    }
}

/// A validated PDF and its page count
pub struct MupdfDocument {
    source: Arc<Vec<u8>>,
    page_count: usize,
}

impl MupdfDocument {
    pub fn from_bytes(data: Vec<u8>) -> RenderResult<Self> {
        if !data.starts_with(b"%PDF") {
            return Err(RenderError::Decode("Not a PDF file".to_string()));
        }

        let doc = Document::from_bytes(&data, PDF_MIME)
            .map_err(|e| RenderError::Decode(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| RenderError::Decode(e.to_string()))?;

        Ok(Self {
            source: Arc::new(data),
            page_count: page_count.max(0) as usize,
        })
    }
}

impl DecodedDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&mut self, index: usize, scale: f32) -> RenderResult<RgbImage> {
        let page_number = index + 1;
        if index >= self.page_count {
            return Err(RenderError::Rasterize {
                page: page_number,
                reason: format!("document has {} pages", self.page_count),
            });
        }

        let rasterize = |reason: mupdf::Error| RenderError::Rasterize {
            page: page_number,
            reason: reason.to_string(),
        };

        let doc = Document::from_bytes(&self.source, PDF_MIME)
            .map_err(|e| RenderError::Decode(e.to_string()))?;
        let page = doc.load_page(index as i32).map_err(rasterize)?;

        let scale = scale.clamp(0.1, MAX_SCALE);
        let matrix = Matrix::new_scale(scale, scale);
        let pixmap = page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
            .map_err(rasterize)?;

        pixmap_to_rgb(&pixmap, page_number)
    }
}

fn pixmap_to_rgb(pixmap: &mupdf::Pixmap, page: usize) -> RenderResult<RgbImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(255);
            let (g, b) = if n >= 3 {
                (
                    samples.get(offset + 1).copied().unwrap_or(255),
                    samples.get(offset + 2).copied().unwrap_or(255),
                )
            } else {
                (r, r)
            };
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or_else(|| RenderError::Rasterize {
        page,
        reason: "pixmap size mismatch".to_string(),
    })
}
