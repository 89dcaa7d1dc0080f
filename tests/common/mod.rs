//! Shared fakes for the integration tests
//!
//! `FakeDecoder` understands a tiny text format instead of PDF:
//! `%PDF-FAKE pages=3 fail=2 delay=20` describes a 3-page document whose
//! second page fails to rasterize and where every page takes 20ms.
//! Pages are 100x150 points, so a page is `100 * scale` by `150 * scale` pixels.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use folio_preview::render::{
    DecodedDocument, DocId, PdfDecoder, RenderCache, RenderError, RenderResult, SourceFetcher,
};

pub const PAGE_WIDTH: f32 = 100.0;
pub const PAGE_HEIGHT: f32 = 150.0;

/// Source bytes for a fake document
pub fn fake_pdf(pages: usize) -> Vec<u8> {
    format!("%PDF-FAKE pages={}", pages).into_bytes()
}

pub fn fake_pdf_failing_at(pages: usize, fail_page: usize) -> Vec<u8> {
    format!("%PDF-FAKE pages={} fail={}", pages, fail_page).into_bytes()
}

pub fn slow_fake_pdf(pages: usize, delay_ms: u64) -> Vec<u8> {
    format!("%PDF-FAKE pages={} delay={}", pages, delay_ms).into_bytes()
}

#[derive(Default)]
pub struct FakeDecoder {
    opens: AtomicUsize,
}

impl FakeDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PdfDecoder for FakeDecoder {
    fn open(&self, bytes: Vec<u8>) -> RenderResult<Box<dyn DecodedDocument>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let text = String::from_utf8(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
        let mut fields = text.split_whitespace();
        if fields.next() != Some("%PDF-FAKE") {
            return Err(RenderError::Decode("not a fake pdf".to_string()));
        }

        let mut doc = FakeDocument::default();
        for field in fields {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| RenderError::Decode(format!("bad field {}", field)))?;
            let value: u64 = value
                .parse()
                .map_err(|_| RenderError::Decode(format!("bad value {}", field)))?;
            match key {
                "pages" => doc.pages = value as usize,
                "fail" => doc.fail_page = Some(value as usize),
                "delay" => doc.delay = Duration::from_millis(value),
                _ => return Err(RenderError::Decode(format!("unknown field {}", key))),
            }
        }

        Ok(Box::new(doc))
    }
}

#[derive(Default)]
struct FakeDocument {
    pages: usize,
    fail_page: Option<usize>,
    delay: Duration,
}

impl DecodedDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn render_page(&mut self, index: usize, scale: f32) -> RenderResult<RgbImage> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_page == Some(index + 1) {
            return Err(RenderError::Rasterize {
                page: index + 1,
                reason: "corrupt content stream".to_string(),
            });
        }

        let width = (PAGE_WIDTH * scale).round() as u32;
        let height = (PAGE_HEIGHT * scale).round() as u32;
        let shade = (index * 40 % 256) as u8;
        Ok(RgbImage::from_pixel(width, height, Rgb([shade, 255 - shade, 128])))
    }
}

/// In-memory fetcher with call counting, failures and optional gates
///
/// The global gate blocks every fetch; a held id blocks only fetches of
/// that id.
#[derive(Default)]
pub struct FakeFetcher {
    files: Mutex<HashMap<DocId, Vec<u8>>>,
    failing: Mutex<HashSet<DocId>>,
    calls: Mutex<HashMap<DocId, usize>>,
    gate: Option<Arc<Semaphore>>,
    held: Mutex<HashMap<DocId, Arc<Semaphore>>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fetcher whose calls block until [`FakeFetcher::release`]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        })
    }

    pub fn insert(&self, id: impl Into<DocId>, bytes: Vec<u8>) {
        self.files.lock().insert(id.into(), bytes);
    }

    pub fn fail(&self, id: impl Into<DocId>) {
        self.failing.lock().insert(id.into());
    }

    pub fn heal(&self, id: impl Into<DocId>) {
        self.failing.lock().remove(&id.into());
    }

    /// Let gated fetches through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Block fetches of one id until [`FakeFetcher::release_id`]
    pub fn hold(&self, id: impl Into<DocId>) {
        self.held
            .lock()
            .insert(id.into(), Arc::new(Semaphore::new(0)));
    }

    pub fn release_id(&self, id: impl Into<DocId>) {
        if let Some(gate) = self.held.lock().remove(&id.into()) {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    pub fn calls(&self, id: impl Into<DocId>) -> usize {
        self.calls.lock().get(&id.into()).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch_bytes(&self, id: &DocId) -> RenderResult<Vec<u8>> {
        *self.calls.lock().entry(id.clone()).or_insert(0) += 1;

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RenderError::Fetch(e.to_string()))?;
        }

        let held = self.held.lock().get(id).cloned();
        if let Some(gate) = held {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RenderError::Fetch(e.to_string()))?;
        }

        if self.failing.lock().contains(id) {
            return Err(RenderError::Fetch(format!("HTTP 500 for {}", id)));
        }

        self.files
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RenderError::Fetch(format!("HTTP 404 for {}", id)))
    }
}

pub fn cache() -> Arc<RenderCache> {
    Arc::new(RenderCache::unbounded())
}

/// Wait until `condition` holds, polling for up to two seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
