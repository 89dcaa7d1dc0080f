//! Preview rendering pipeline
//!
//! Turns PDF files held by the knowledge-base API into JPEG images for two
//! consumers: a grid of first-page thumbnails and a full-document viewer.
//!
//! # Components
//!
//! - [`RenderCache`]: shared result cache with single-flight markers
//! - [`ThumbnailOrchestrator`]: lazy, deduplicated first-page renders
//! - [`ViewerSession`]: every page of one file plus zoom and page tracking
//! - [`SourceFetcher`] / [`PdfDecoder`]: the two capabilities the pipeline consumes

mod cache;
mod encode;
mod error;
mod layout;
mod raster;
mod thumbnails;
mod traits;
mod types;
mod viewer;
mod zoom;

pub use cache::{BeginOutcome, CacheStats, InFlightGuard, RenderCache, RetryPolicy};
pub use encode::encode_jpeg;
pub use error::{RenderError, RenderResult};
pub use layout::{PageBox, PageLayout, PAGE_GAP};
pub use raster::RasterSettings;
pub use thumbnails::{SyncReport, ThumbnailEvent, ThumbnailOrchestrator, ThumbnailSettings};
pub use traits::{DecodedDocument, PdfDecoder, SourceFetcher};
pub use types::{CachedRender, DocId, RenderKey, RenderKind, RenderStatus, RenderedImage};
pub use viewer::{
    PageFailure, PageSequence, PartialFailurePolicy, RenderedPages, ViewerPhase, ViewerSession,
    ViewerSettings, ViewerSnapshot,
};
pub use zoom::{Zoom, ZoomDirection};
