//! Knowledge-base payloads
//!
//! Field names follow the upstream JSON (snake_case, except `documentTitle`
//! on search hits). Everything except identifiers is optional because the
//! upstream omits empty fields.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::render::DocId;

/// Metadata from `GET /file?id=..&detail=1`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cid: Option<DocId>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub view: Option<u64>,
    /// View timestamps, oldest first
    #[serde(default)]
    pub history: Vec<String>,
}

impl FileDetail {
    pub fn modified(&self) -> Option<DateTime<FixedOffset>> {
        self.modified_at.as_deref().and_then(parse_timestamp)
    }

    pub fn created(&self) -> Option<DateTime<FixedOffset>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    /// Most recent entry of the view history
    pub fn last_viewed(&self) -> Option<DateTime<FixedOffset>> {
        self.history.iter().filter_map(|h| parse_timestamp(h)).max()
    }

    /// Name to save a download under
    pub fn download_name(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => "document.pdf".to_string(),
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

/// Entry of `GET /category`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: DocId,
    pub name: String,
}

/// File entry as listed in documents and search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: DocId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<u64>,
    /// Owning document's title (search hits only)
    #[serde(
        default,
        rename = "documentTitle",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_title: Option<String>,
}

impl FileSummary {
    /// Label for a search hit: `Document > File` when the document is known
    pub fn display_title(&self) -> String {
        let title = self.title.as_deref().unwrap_or("Untitled Document");
        match &self.document_title {
            Some(document) => format!("{} > {}", document, title),
            None => title.to_string(),
        }
    }
}

/// `GET /document?id=..`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbDocument {
    pub id: DocId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub files: Vec<FileSummary>,
}

impl KbDocument {
    pub fn file_ids(&self) -> Vec<DocId> {
        self.files.iter().map(|f| f.id.clone()).collect()
    }
}

/// Raw file content with the headers that describe it
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Upload for `POST /file`
#[derive(Debug, Clone)]
pub struct NewFile {
    pub title: String,
    pub cid: Option<DocId>,
    pub author: Option<String>,
    /// Owning document
    pub did: Option<DocId>,
    pub description: Option<String>,
    pub file_name: String,
    pub attachment: Vec<u8>,
}

/// Changed fields for `PUT /file`
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub id: DocId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cid: Option<DocId>,
    pub author: Option<String>,
}

impl FileUpdate {
    pub fn new(id: impl Into<DocId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("id", self.id.to_string())];
        if let Some(title) = &self.title {
            form.push(("title", title.clone()));
        }
        if let Some(description) = &self.description {
            form.push(("description", description.clone()));
        }
        if let Some(cid) = &self.cid {
            form.push(("cid", cid.to_string()));
        }
        if let Some(author) = &self.author {
            form.push(("author", author.clone()));
        }
        form
    }
}

/// `POST /document`
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
}

impl NewDocument {
    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("title", self.title.clone())];
        if let Some(description) = &self.description {
            form.push(("description", description.clone()));
        }
        form
    }
}

/// `PUT /document`
#[derive(Debug, Clone)]
pub struct DocumentUpdate {
    pub id: DocId,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl DocumentUpdate {
    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("id", self.id.to_string())];
        if let Some(title) = &self.title {
            form.push(("title", title.clone()));
        }
        if let Some(description) = &self.description {
            form.push(("description", description.clone()));
        }
        form
    }
}
