//! JPEG encoding of rasterized pages

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::error::{RenderError, RenderResult};
use super::types::RenderedImage;

/// Encode an RGB raster as JPEG at the given quality (1-100)
pub fn encode_jpeg(raster: &RgbImage, quality: u8) -> RenderResult<RenderedImage> {
    let quality = quality.clamp(1, 100);
    let mut output = Vec::new();

    JpegEncoder::new_with_quality(&mut output, quality)
        .encode_image(raster)
        .map_err(|e| RenderError::ImageError(e.to_string()))?;

    Ok(RenderedImage::new(output, raster.width(), raster.height()))
}
