//! Core render pipeline types

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a knowledge-base file
///
/// The upstream API hands out numeric ids but the pipeline treats them as
/// opaque strings, so both JSON numbers and strings deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for DocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Unsigned(u64),
            Signed(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Unsigned(n) => DocId(n.to_string()),
            RawId::Signed(n) => DocId(n.to_string()),
            RawId::Text(s) => DocId(s),
        })
    }
}

/// An encoded page image (JPEG)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl RenderedImage {
    pub const MIME: &'static str = "image/jpeg";

    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
        }
    }

    /// Encoded JPEG bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `data:image/jpeg;base64,...` form for direct use in an `<img src>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", Self::MIME, BASE64.encode(&self.data))
    }
}

/// What was rendered for an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderKind {
    /// First page only, fixed thumbnail scale
    Thumbnail,
    /// Every page, at a given scale (hundredths, for stable hashing)
    Pages { scale: u32 },
}

impl RenderKind {
    pub fn pages(scale: f32) -> Self {
        Self::Pages {
            scale: (scale * 100.0).round() as u32,
        }
    }
}

/// Cache key for rendered content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub id: DocId,
    pub kind: RenderKind,
}

impl RenderKey {
    pub fn thumbnail(id: impl Into<DocId>) -> Self {
        Self {
            id: id.into(),
            kind: RenderKind::Thumbnail,
        }
    }

    pub fn pages(id: impl Into<DocId>, scale: f32) -> Self {
        Self {
            id: id.into(),
            kind: RenderKind::pages(scale),
        }
    }
}

/// Cached render output
#[derive(Debug, Clone, PartialEq)]
pub enum CachedRender {
    Thumbnail(RenderedImage),
    Pages(Arc<Vec<RenderedImage>>),
}

impl CachedRender {
    pub fn as_thumbnail(&self) -> Option<&RenderedImage> {
        match self {
            CachedRender::Thumbnail(image) => Some(image),
            CachedRender::Pages(_) => None,
        }
    }

    pub fn as_pages(&self) -> Option<&Arc<Vec<RenderedImage>>> {
        match self {
            CachedRender::Pages(pages) => Some(pages),
            CachedRender::Thumbnail(_) => None,
        }
    }
}

/// Observable render state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenderStatus {
    /// Never requested, or invalidated
    Absent,
    /// A render is in flight
    Loading,
    /// Output is cached
    Ready,
    /// Last render failed; `terminal` means no further automatic retries
    Failed { attempts: u32, terminal: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_accepts_numbers_and_strings() {
        let ids: Vec<DocId> = serde_json::from_str(r#"[1, "2", -3]"#).unwrap();
        assert_eq!(ids, vec![DocId::from("1"), DocId::from("2"), DocId::from("-3")]);
    }

    #[test]
    fn test_data_uri_prefix() {
        let image = RenderedImage::new(vec![0xFF, 0xD8, 0xFF], 1, 1);
        assert_eq!(image.data_uri(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_pages_key_scale_hundredths() {
        let key = RenderKey::pages("7", 2.2);
        assert_eq!(key.kind, RenderKind::Pages { scale: 220 });
        assert_ne!(key, RenderKey::thumbnail("7"));
    }

    #[test]
    fn test_failed_status_serialization() {
        let json = serde_json::to_value(RenderStatus::Failed {
            attempts: 2,
            terminal: false,
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["attempts"], 2);
    }
}
