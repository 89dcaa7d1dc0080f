//! Knowledge-base API
//!
//! Typed client for the REST service that stores files, documents and
//! categories. The client doubles as the pipeline's [`SourceFetcher`](crate::render::SourceFetcher).

mod client;
mod error;
mod types;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use types::{
    Category, DocumentUpdate, Download, FileDetail, FileSummary, FileUpdate, KbDocument,
    NewDocument, NewFile,
};
