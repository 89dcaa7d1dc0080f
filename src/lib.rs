//! Folio Preview
//!
//! PDF preview service for a knowledge-base front end: lazily rendered,
//! deduplicated first-page thumbnails and a full-document viewer with zoom
//! and current-page tracking.
//!
//! # Modules
//!
//! - `render`: thumbnail orchestration, viewer sessions and the shared render cache
//! - `formats`: MuPDF-backed decoder (feature `pdf`)
//! - `api`: knowledge-base REST client
//! - `routes`: HTTP surface over the pipeline

pub mod api;
pub mod config;
pub mod error;
pub mod formats;
pub mod render;
pub mod routes;
pub mod state;
