//! Application state management

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::render::{PdfDecoder, RenderCache, SourceFetcher, ThumbnailOrchestrator, ViewerSession};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize knowledge base client: {0}")]
    ApiInit(#[from] ApiError),
}

/// How often idle viewer sessions are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A live viewer, when it was created and when a request last touched it
#[derive(Clone)]
pub struct ViewerEntry {
    pub session: Arc<ViewerSession>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    api: ApiClient,
    fetcher: Arc<dyn SourceFetcher>,
    decoder: Arc<dyn PdfDecoder>,
    cache: Arc<RenderCache>,
    thumbnails: ThumbnailOrchestrator,
    viewers: Mutex<HashMap<Uuid, ViewerEntry>>,
}

impl AppState {
    /// Create the state used by the server binary
    ///
    /// PDFs are fetched through the knowledge-base client and decoded with MuPDF.
    #[cfg(feature = "pdf")]
    pub fn new(config: Config) -> Result<Self, StateError> {
        let api = ApiClient::new(config.api.base_url.clone(), config.api.timeout_secs)?;
        let fetcher: Arc<dyn SourceFetcher> = Arc::new(api.clone());
        let decoder: Arc<dyn PdfDecoder> = Arc::new(crate::formats::MupdfDecoder::new());

        Ok(Self::with_parts(config, api, fetcher, decoder))
    }

    /// Assemble state from explicit collaborators
    pub fn with_parts(
        config: Config,
        api: ApiClient,
        fetcher: Arc<dyn SourceFetcher>,
        decoder: Arc<dyn PdfDecoder>,
    ) -> Self {
        let cache = Arc::new(RenderCache::with_capacity(config.render.cache_capacity));
        let thumbnails = ThumbnailOrchestrator::new(
            cache.clone(),
            fetcher.clone(),
            decoder.clone(),
            config.render.thumbnail_settings(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                fetcher,
                decoder,
                cache,
                thumbnails,
                viewers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the knowledge-base client
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get the shared render cache
    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.inner.cache
    }

    pub fn thumbnails(&self) -> &ThumbnailOrchestrator {
        &self.inner.thumbnails
    }

    /// Register a new, empty viewer session
    ///
    /// When the registry is full the least recently used session is closed
    /// to make room.
    pub fn create_viewer(&self) -> (Uuid, Arc<ViewerSession>) {
        let session = Arc::new(ViewerSession::new(
            self.inner.fetcher.clone(),
            self.inner.decoder.clone(),
            self.inner.cache.clone(),
            self.inner.config.render.viewer_settings(),
        ));
        let id = Uuid::new_v4();
        let now = Utc::now();

        let evicted = {
            let mut viewers = self.inner.viewers.lock();
            let max = self.inner.config.viewer.max_sessions;
            let evicted = if max > 0 && viewers.len() >= max {
                let oldest = viewers
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(oldest, _)| *oldest);
                oldest.and_then(|oldest| viewers.remove(&oldest).map(|entry| (oldest, entry)))
            } else {
                None
            };
            viewers.insert(
                id,
                ViewerEntry {
                    session: session.clone(),
                    created_at: now,
                    last_access: now,
                },
            );
            evicted
        };

        if let Some((oldest, entry)) = evicted {
            entry.session.close();
            tracing::info!("Viewer limit reached, closed least recently used session {}", oldest);
        }
        tracing::debug!("Created viewer session {}", id);

        (id, session)
    }

    /// Register a session that is removed again unless [`PendingViewer::commit`]
    /// is called
    ///
    /// Use this around an `open` whose future may be dropped, such as a
    /// request handler whose client disconnects.
    pub fn reserve_viewer(&self) -> PendingViewer {
        let (id, session) = self.create_viewer();
        PendingViewer {
            state: self.clone(),
            id,
            session,
            committed: false,
        }
    }

    /// Look up a session and mark it as used
    pub fn viewer(&self, id: &Uuid) -> Option<Arc<ViewerSession>> {
        self.viewer_entry(id).map(|entry| entry.session)
    }

    /// Look up a session with its timestamps and mark it as used
    pub fn viewer_entry(&self, id: &Uuid) -> Option<ViewerEntry> {
        let mut viewers = self.inner.viewers.lock();
        let entry = viewers.get_mut(id)?;
        entry.last_access = Utc::now();
        Some(entry.clone())
    }

    /// Close sessions not touched since `now - max_idle`
    ///
    /// Returns how many were removed.
    pub fn sweep_idle_viewers(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> usize {
        let expired: Vec<(Uuid, ViewerEntry)> = {
            let mut viewers = self.inner.viewers.lock();
            let stale: Vec<Uuid> = viewers
                .iter()
                .filter(|(_, entry)| now - entry.last_access >= max_idle)
                .map(|(id, _)| *id)
                .collect();
            stale
                .into_iter()
                .filter_map(|id| viewers.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &expired {
            entry.session.close();
            tracing::debug!("Closed idle viewer session {}", id);
        }
        if !expired.is_empty() {
            tracing::info!("Swept {} idle viewer session(s)", expired.len());
        }
        expired.len()
    }

    /// Periodically close idle viewer sessions
    ///
    /// Returns `None` when idle expiry is disabled.
    pub fn spawn_viewer_sweeper(&self) -> Option<JoinHandle<()>> {
        let idle_secs = self.inner.config.viewer.idle_secs;
        if idle_secs == 0 {
            return None;
        }
        let max_idle = chrono::Duration::seconds(idle_secs.min(i64::MAX as u64 / 1000) as i64);
        let state = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                state.sweep_idle_viewers(Utc::now(), max_idle);
            }
        }))
    }

    /// Close a session and drop it from the registry
    pub fn remove_viewer(&self, id: &Uuid) -> bool {
        let removed = self.inner.viewers.lock().remove(id);
        match removed {
            Some(entry) => {
                entry.session.close();
                tracing::debug!("Removed viewer session {}", id);
                true
            }
            None => false,
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.viewers.lock().len()
    }
}

/// A viewer session that is dropped from the registry unless committed
pub struct PendingViewer {
    state: AppState,
    id: Uuid,
    session: Arc<ViewerSession>,
    committed: bool,
}

impl PendingViewer {
    pub fn session(&self) -> &Arc<ViewerSession> {
        &self.session
    }

    /// Keep the session registered
    pub fn commit(mut self) -> Uuid {
        self.committed = true;
        self.id
    }
}

impl Drop for PendingViewer {
    fn drop(&mut self) {
        if !self.committed {
            self.state.remove_viewer(&self.id);
        }
    }
}
