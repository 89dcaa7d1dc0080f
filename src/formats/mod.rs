//! Format-specific decoders
//!
//! Implementations of the [`PdfDecoder`](crate::render::PdfDecoder) capability
//! backed by real rendering libraries.

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(feature = "pdf")]
pub use pdf::MupdfDecoder;
