//! Viewer session
//!
//! Renders every page of one file for an inline scrolling viewer and tracks
//! the interactive state around it (zoom, current page).
//!
//! # Generations
//!
//! Each [`ViewerSession::open`] starts a new generation; [`ViewerSession::close`]
//! starts one too. A render pass checks its generation after the fetch and
//! before every page and only commits if it is still current, so an open that
//! was superseded or closed stops early and never writes into the session.
//! Two page sequences are never interleaved.
//!
//! # Shared renders
//!
//! Page sequences are keyed by document and scale in the shared
//! [`RenderCache`]. Sessions opening the same document at the same scale
//! share one render, and a sequence invalidated while rendering is shown to
//! the session that rendered it but never stored.
//!
//! # Partial failures
//!
//! The decode loop reports the pages rendered so far plus the first page
//! failure. What to show is decided separately by [`PartialFailurePolicy`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::cache::{BeginOutcome, RenderCache};
use super::error::{RenderError, RenderResult};
use super::layout::{PageLayout, PAGE_GAP};
use super::raster::{self, RasterSettings};
use super::traits::{PdfDecoder, SourceFetcher};
use super::types::{CachedRender, DocId, RenderKey, RenderedImage};
use super::zoom::{Zoom, ZoomDirection};

/// What to show when a page fails mid-sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// Discard everything and fail the open
    #[default]
    #[serde(rename = "abort")]
    AbortAll,
    /// Keep the pages rendered before the failure
    #[serde(rename = "partial")]
    ShowPartial,
}

/// A page that could not be rendered (1-based)
#[derive(Debug)]
pub struct PageFailure {
    pub page: usize,
    pub error: RenderError,
}

/// Raw output of the decode loop
#[derive(Debug)]
pub struct RenderedPages {
    pub pages: Vec<RenderedImage>,
    pub failure: Option<PageFailure>,
}

/// Pages to display
#[derive(Debug)]
pub struct PageSequence {
    pub pages: Vec<RenderedImage>,
    /// First page that failed, when the sequence was cut short
    pub truncated_at: Option<usize>,
}

impl PartialFailurePolicy {
    pub fn resolve(self, rendered: RenderedPages) -> RenderResult<PageSequence> {
        let RenderedPages { pages, failure } = rendered;

        match (self, failure) {
            (_, None) => Ok(PageSequence {
                pages,
                truncated_at: None,
            }),
            (PartialFailurePolicy::ShowPartial, Some(failure)) if !pages.is_empty() => {
                tracing::warn!(
                    "Showing {} page(s); page {} failed: {}",
                    pages.len(),
                    failure.page,
                    failure.error
                );
                Ok(PageSequence {
                    pages,
                    truncated_at: Some(failure.page),
                })
            }
            (_, Some(failure)) => Err(failure.error),
        }
    }
}

/// Viewer render configuration
#[derive(Debug, Clone, Copy)]
pub struct ViewerSettings {
    /// Base raster settings; the effective scale is `raster.scale * zoom`
    pub raster: RasterSettings,
    pub partial: PartialFailurePolicy,
    /// Gap between pages in the scroll layout
    pub page_gap: f32,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            raster: RasterSettings {
                scale: 2.0,
                quality: 95,
                timeout_secs: 30,
            },
            partial: PartialFailurePolicy::default(),
            page_gap: PAGE_GAP,
        }
    }
}

/// Lifecycle phase of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum ViewerPhase {
    Closed,
    Loading,
    Ready,
    Failed { message: String },
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSnapshot {
    pub doc_id: Option<DocId>,
    #[serde(flatten)]
    pub phase: ViewerPhase,
    pub page_count: usize,
    /// 1-based, 0 when nothing is shown
    pub current_page: usize,
    pub zoom: Zoom,
    pub zoom_percent: u32,
    pub render_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_at: Option<usize>,
    pub layout: PageLayout,
}

struct ViewerState {
    doc_id: Option<DocId>,
    phase: ViewerPhase,
    pages: Arc<Vec<RenderedImage>>,
    render_scale: f32,
    zoom: Zoom,
    current_page: usize,
    truncated_at: Option<usize>,
}

impl ViewerState {
    fn reset(&mut self, doc_id: Option<DocId>, phase: ViewerPhase) {
        self.doc_id = doc_id;
        self.phase = phase;
        self.pages = Arc::default();
        self.current_page = 0;
        self.truncated_at = None;
    }

    fn layout(&self, gap: f32) -> PageLayout {
        let zoom = self.zoom.factor();
        let scale = self.render_scale;
        PageLayout::from_heights(
            self.pages
                .iter()
                .map(|page| page.height() as f32 / scale * zoom),
            gap,
        )
    }
}

/// Full-document viewer for one selected file
pub struct ViewerSession {
    fetcher: Arc<dyn SourceFetcher>,
    decoder: Arc<dyn PdfDecoder>,
    cache: Arc<RenderCache>,
    settings: ViewerSettings,
    state: Mutex<ViewerState>,
    /// Only bumped while holding `state`
    generation: AtomicU64,
}

impl ViewerSession {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        decoder: Arc<dyn PdfDecoder>,
        cache: Arc<RenderCache>,
        settings: ViewerSettings,
    ) -> Self {
        Self {
            fetcher,
            decoder,
            cache,
            settings,
            state: Mutex::new(ViewerState {
                doc_id: None,
                phase: ViewerPhase::Closed,
                pages: Arc::default(),
                render_scale: settings.raster.scale,
                zoom: Zoom::default(),
                current_page: 0,
                truncated_at: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Fetch, decode and rasterize every page of `id`
    ///
    /// Replaces whatever the session showed before. Returns the number of
    /// pages shown, or [`RenderError::Cancelled`] if a newer `open` or a
    /// `close` happened while this one was running.
    pub async fn open(&self, id: DocId) -> RenderResult<usize> {
        self.load(id, None).await
    }

    /// Shared body of `open` and `refresh`; `keep_page` is clamped to the
    /// new page count on success
    async fn load(&self, id: DocId, keep_page: Option<usize>) -> RenderResult<usize> {
        let (generation, scale) = {
            let mut state = self.state.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.reset(Some(id.clone()), ViewerPhase::Loading);
            state.render_scale = self.settings.raster.scale * state.zoom.factor();
            (generation, state.render_scale)
        };

        tracing::debug!("Opening '{}' at scale {:.2} (generation {})", id, scale, generation);

        let result = self.load_pages(&id, generation, scale).await;

        let mut state = self.state.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Open of '{}' superseded, dropping result", id);
            return Err(RenderError::Cancelled);
        }

        match result {
            Ok((pages, truncated_at)) => {
                let count = pages.len();
                state.pages = pages;
                state.truncated_at = truncated_at;
                state.current_page = keep_page.map_or(1, |page| page.clamp(1, count.max(1)));
                state.phase = ViewerPhase::Ready;
                tracing::info!("Viewer ready: '{}' with {} page(s)", id, count);
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Failed to open '{}': {}", id, e);
                let phase = ViewerPhase::Failed {
                    message: e.to_string(),
                };
                state.reset(Some(id), phase);
                Err(e)
            }
        }
    }

    /// Pages for `id` at `scale`, from the shared cache when possible
    ///
    /// Goes through the cache's single-flight claim: when another session is
    /// already rendering the same document at the same scale this waits for
    /// that render instead of starting a second one. Only a complete
    /// sequence from a render that is still the latest for its key is
    /// stored.
    async fn load_pages(
        &self,
        id: &DocId,
        generation: u64,
        scale: f32,
    ) -> RenderResult<(Arc<Vec<RenderedImage>>, Option<usize>)> {
        let key = RenderKey::pages(id.clone(), scale);

        loop {
            match self.cache.try_begin(key.clone()) {
                BeginOutcome::Cached => {
                    if let Some(pages) = self.cache.get(&key).and_then(|c| c.as_pages().cloned()) {
                        tracing::debug!("Reusing {} cached page(s) for '{}'", pages.len(), id);
                        return Ok((pages, None));
                    }
                    // Evicted between the claim and the read
                }
                BeginOutcome::InFlight => {
                    tracing::debug!("Waiting for running render of '{}'", id);
                    self.cache.wait_for(&key).await;
                    self.ensure_current(generation)?;
                }
                BeginOutcome::Started(guard) => {
                    let rendered = self.render_all(id, generation, scale).await?;
                    let sequence = self.settings.partial.resolve(rendered)?;
                    let pages = Arc::new(sequence.pages);
                    if sequence.truncated_at.is_none()
                        && !guard.complete(CachedRender::Pages(pages.clone()))
                    {
                        tracing::debug!("Pages of '{}' were invalidated while rendering", id);
                    }
                    return Ok((pages, sequence.truncated_at));
                }
                BeginOutcome::Failed => {
                    let rendered = self.render_all(id, generation, scale).await?;
                    let sequence = self.settings.partial.resolve(rendered)?;
                    return Ok((Arc::new(sequence.pages), sequence.truncated_at));
                }
            }
        }
    }

    async fn render_all(
        &self,
        id: &DocId,
        generation: u64,
        scale: f32,
    ) -> RenderResult<RenderedPages> {
        let bytes = self.fetcher.fetch_bytes(id).await?;
        self.ensure_current(generation)?;

        let settings = RasterSettings {
            scale,
            ..self.settings.raster
        };
        let mut doc = raster::decode(self.decoder.clone(), bytes, settings.timeout_secs).await?;
        let page_count = doc.page_count();
        let mut pages = Vec::with_capacity(page_count);

        for index in 0..page_count {
            self.ensure_current(generation)?;
            match raster::render_page(doc, index, settings).await {
                Ok((next, image)) => {
                    doc = next;
                    pages.push(image);
                }
                Err(error) => {
                    return Ok(RenderedPages {
                        pages,
                        failure: Some(PageFailure {
                            page: index + 1,
                            error,
                        }),
                    });
                }
            }
        }

        Ok(RenderedPages {
            pages,
            failure: None,
        })
    }

    fn ensure_current(&self, generation: u64) -> RenderResult<()> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(RenderError::Cancelled)
        }
    }

    /// Re-rasterize the open document at the current zoom, staying on the
    /// current page
    pub async fn refresh(&self) -> RenderResult<usize> {
        let (id, page) = {
            let state = self.state.lock();
            let id = state.doc_id.clone().ok_or(RenderError::NoDocument)?;
            (id, state.current_page)
        };
        self.load(id, Some(page)).await
    }

    /// Release all pages and cancel any running open
    pub fn close(&self) {
        let mut state = self.state.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = &state.doc_id {
            tracing::debug!("Closing viewer for '{}'", id);
        }
        state.reset(None, ViewerPhase::Closed);
    }

    /// Step the display zoom; pages are not re-rasterized
    pub fn zoom(&self, direction: ZoomDirection) -> Zoom {
        let mut state = self.state.lock();
        state.zoom.step(direction);
        state.zoom
    }

    pub fn zoom_in(&self) -> Zoom {
        self.zoom(ZoomDirection::In)
    }

    pub fn zoom_out(&self) -> Zoom {
        self.zoom(ZoomDirection::Out)
    }

    /// Update the current page from the scroll container's position
    pub fn on_scroll(&self, scroll_top: f32, viewport_height: f32) -> usize {
        let mut state = self.state.lock();
        if let Some(page) = state
            .layout(self.settings.page_gap)
            .current_page(scroll_top, viewport_height)
        {
            state.current_page = page;
        }
        state.current_page
    }

    /// Rendered page (1-based)
    pub fn page(&self, page: usize) -> Option<RenderedImage> {
        let index = page.checked_sub(1)?;
        self.state.lock().pages.get(index).cloned()
    }

    pub fn pages(&self) -> Arc<Vec<RenderedImage>> {
        self.state.lock().pages.clone()
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().current_page
    }

    pub fn doc_id(&self) -> Option<DocId> {
        self.state.lock().doc_id.clone()
    }

    pub fn phase(&self) -> ViewerPhase {
        self.state.lock().phase.clone()
    }

    pub fn layout(&self) -> PageLayout {
        self.state.lock().layout(self.settings.page_gap)
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        let state = self.state.lock();
        ViewerSnapshot {
            doc_id: state.doc_id.clone(),
            phase: state.phase.clone(),
            page_count: state.pages.len(),
            current_page: state.current_page,
            zoom: state.zoom,
            zoom_percent: state.zoom.percent(),
            render_scale: state.render_scale,
            truncated_at: state.truncated_at,
            layout: state.layout(self.settings.page_gap),
        }
    }
}
