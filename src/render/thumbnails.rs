//! Thumbnail orchestrator
//!
//! Keeps first-page thumbnails in the [`RenderCache`] for whatever list of
//! entries the UI is currently showing. Call [`ThumbnailOrchestrator::sync`]
//! every time the list changes:
//!
//! - ids already cached, already rendering, or terminally failed are skipped
//! - every other id gets its own task (fetch, decode, rasterize page 1, encode)
//! - tasks never wait on each other and may finish in any order
//!
//! Failures are logged and leave the id uncached, so a later `sync` retries
//! it until the [`RetryPolicy`] cap is reached. Observers can poll
//! [`status`](ThumbnailOrchestrator::status) or [`subscribe`](ThumbnailOrchestrator::subscribe)
//! to events.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};

use super::cache::{BeginOutcome, InFlightGuard, RenderCache, RetryPolicy};
use super::error::RenderResult;
use super::raster::{self, RasterSettings};
use super::traits::{PdfDecoder, SourceFetcher};
use super::types::{CachedRender, DocId, RenderKey, RenderStatus, RenderedImage};

/// Event channel depth; slow subscribers see `Lagged` and should re-poll
const EVENT_CAPACITY: usize = 256;

/// Thumbnail render configuration
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSettings {
    pub raster: RasterSettings,
    pub retry: RetryPolicy,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            raster: RasterSettings {
                scale: 2.0,
                quality: 100,
                timeout_secs: 30,
            },
            retry: RetryPolicy::default(),
        }
    }
}

/// Status change for one thumbnail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailEvent {
    pub id: DocId,
    #[serde(flatten)]
    pub status: RenderStatus,
}

/// What a [`ThumbnailOrchestrator::sync`] call did
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Ids for which a render was started
    pub started: Vec<DocId>,
    /// Ids skipped because they were cached
    pub cached: usize,
    /// Ids skipped because a render was already running
    pub in_flight: usize,
    /// Ids skipped because they failed terminally
    pub failed: usize,
    /// One handle per started render
    pub handles: Vec<JoinHandle<()>>,
}

impl SyncReport {
    /// Wait for every render started by this sync to finish
    pub async fn wait(self) {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::error!("Thumbnail task panicked: {}", e);
                }
            }
        }
    }
}

/// Drives thumbnail rendering for a changing list of entries
pub struct ThumbnailOrchestrator {
    cache: Arc<RenderCache>,
    fetcher: Arc<dyn SourceFetcher>,
    decoder: Arc<dyn PdfDecoder>,
    settings: ThumbnailSettings,
    events: broadcast::Sender<ThumbnailEvent>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl ThumbnailOrchestrator {
    pub fn new(
        cache: Arc<RenderCache>,
        fetcher: Arc<dyn SourceFetcher>,
        decoder: Arc<dyn PdfDecoder>,
        settings: ThumbnailSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            fetcher,
            decoder,
            settings,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start renders for every id that needs one
    ///
    /// Must be called from within a Tokio runtime.
    pub fn sync<'a, I>(&self, ids: I) -> SyncReport
    where
        I: IntoIterator<Item = &'a DocId>,
    {
        let mut report = SyncReport::default();

        for id in ids {
            match self.cache.try_begin(RenderKey::thumbnail(id.clone())) {
                BeginOutcome::Started(guard) => {
                    report.started.push(id.clone());
                    report.handles.push(self.spawn_render(guard));
                }
                BeginOutcome::Cached => report.cached += 1,
                BeginOutcome::InFlight => report.in_flight += 1,
                BeginOutcome::Failed => report.failed += 1,
            }
        }

        if !report.started.is_empty() {
            tracing::debug!(
                "Thumbnail sync started {} render(s), {} cached, {} in flight, {} failed",
                report.started.len(),
                report.cached,
                report.in_flight,
                report.failed
            );
        }

        report
    }

    fn spawn_render(&self, guard: InFlightGuard) -> JoinHandle<()> {
        let fetcher = self.fetcher.clone();
        let decoder = self.decoder.clone();
        let events = self.events.clone();
        let settings = self.settings;

        let handle = tokio::spawn(async move {
            let id = guard.key().id.clone();
            let _ = events.send(ThumbnailEvent {
                id: id.clone(),
                status: RenderStatus::Loading,
            });

            match render_thumbnail(fetcher, decoder, &id, settings.raster).await {
                Ok(image) => {
                    if guard.complete(CachedRender::Thumbnail(image)) {
                        tracing::debug!("Thumbnail ready for '{}'", id);
                        let _ = events.send(ThumbnailEvent {
                            id,
                            status: RenderStatus::Ready,
                        });
                    } else {
                        tracing::debug!("Discarded stale thumbnail for '{}'", id);
                    }
                }
                Err(e) => {
                    let status = guard.fail(&settings.retry);
                    tracing::warn!("Thumbnail render failed for '{}': {}", id, e);
                    let _ = events.send(ThumbnailEvent { id, status });
                }
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle.abort_handle());

        handle
    }

    /// Current state of an id's thumbnail
    pub fn status(&self, id: &DocId) -> RenderStatus {
        self.cache.status(&RenderKey::thumbnail(id.clone()))
    }

    /// Cached thumbnail, if rendered
    pub fn thumbnail(&self, id: &DocId) -> Option<RenderedImage> {
        self.cache.thumbnail(id)
    }

    /// Forget an id's thumbnail so the next sync renders it again
    pub fn invalidate(&self, id: &DocId) {
        self.cache.invalidate(&RenderKey::thumbnail(id.clone()));
    }

    /// Receive status changes as renders progress
    pub fn subscribe(&self) -> broadcast::Receiver<ThumbnailEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    /// Number of renders still running
    pub fn active_renders(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Abort every outstanding render; their in-flight markers are released
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            tracing::debug!("Aborting {} thumbnail render(s)", tasks.len());
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for ThumbnailOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn render_thumbnail(
    fetcher: Arc<dyn SourceFetcher>,
    decoder: Arc<dyn PdfDecoder>,
    id: &DocId,
    settings: RasterSettings,
) -> RenderResult<RenderedImage> {
    let bytes = fetcher.fetch_bytes(id).await?;
    let doc = raster::decode(decoder, bytes, settings.timeout_secs).await?;
    let (_doc, image) = raster::render_page(doc, 0, settings).await?;
    Ok(image)
}
