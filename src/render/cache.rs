//! Render cache with single-flight bookkeeping
//!
//! Maps a [`RenderKey`] to its rendered output and tracks which keys have a
//! render running. Both live behind one lock so that "check cache, check
//! in-flight, mark in-flight" is a single atomic step ([`RenderCache::try_begin`]).
//!
//! Every render start is tagged with a monotonically increasing token. The
//! cache remembers the latest token issued per key and only accepts output
//! carrying that token, so a slow render that was superseded (for example by
//! [`RenderCache::invalidate`]) can never overwrite newer content.
//!
//! Callers that find a key in flight can park on [`RenderCache::wait_for`]
//! until the running render settles instead of starting a duplicate.
//!
//! The store is unbounded by default. With a capacity it evicts the least
//! recently *written* entry: lookups use `peek` and never reorder.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::types::{CachedRender, DocId, RenderKey, RenderStatus, RenderedImage};

/// Retry cap for failed renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts before the key turns terminal (0 = retry forever)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn unlimited() -> Self {
        Self { max_attempts: 0 }
    }

    fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Outcome of [`RenderCache::try_begin`]
#[derive(Debug)]
pub enum BeginOutcome {
    /// Caller now owns the render for this key
    Started(InFlightGuard),
    /// Output already cached
    Cached,
    /// Another render for this key is running
    InFlight,
    /// Key failed terminally; invalidate it to try again
    Failed,
}

#[derive(Debug, Default, Clone, Copy)]
struct FailureRecord {
    attempts: u32,
    terminal: bool,
}

struct CacheInner {
    entries: LruCache<RenderKey, CachedRender>,
    /// Token of the render holding each in-flight marker
    in_flight: HashMap<RenderKey, u64>,
    /// Latest token issued per key
    latest: HashMap<RenderKey, u64>,
    failures: HashMap<RenderKey, FailureRecord>,
    next_token: u64,
}

impl CacheInner {
    fn issue_token(&mut self, key: &RenderKey) -> u64 {
        self.next_token += 1;
        self.latest.insert(key.clone(), self.next_token);
        self.next_token
    }

    fn is_latest(&self, key: &RenderKey, token: u64) -> bool {
        self.latest.get(key) == Some(&token)
    }

    fn release(&mut self, key: &RenderKey, token: u64) {
        if self.in_flight.get(key) == Some(&token) {
            self.in_flight.remove(key);
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub failures: usize,
    /// `None` when unbounded
    pub capacity: Option<usize>,
}

/// In-memory render cache, scoped to one service lifetime
pub struct RenderCache {
    inner: Mutex<CacheInner>,
    /// Signalled whenever an in-flight marker goes away
    settled: Notify,
    capacity: Option<NonZeroUsize>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RenderCache {
    /// Create a cache that grows without bound
    pub fn unbounded() -> Self {
        Self::build(LruCache::unbounded(), None)
    }

    /// Create a cache holding at most `capacity` entries (0 = unbounded)
    pub fn with_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(cap) => Self::build(LruCache::new(cap), Some(cap)),
            None => Self::unbounded(),
        }
    }

    fn build(entries: LruCache<RenderKey, CachedRender>, capacity: Option<NonZeroUsize>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries,
                in_flight: HashMap::new(),
                latest: HashMap::new(),
                failures: HashMap::new(),
                next_token: 0,
            }),
            settled: Notify::new(),
            capacity,
        }
    }

    /// Look up cached output without side effects
    pub fn get(&self, key: &RenderKey) -> Option<CachedRender> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Cached thumbnail for an identifier
    pub fn thumbnail(&self, id: &DocId) -> Option<RenderedImage> {
        self.get(&RenderKey::thumbnail(id.clone()))
            .and_then(|render| render.as_thumbnail().cloned())
    }

    /// Store output unconditionally, clearing any failure record
    pub fn put(&self, key: RenderKey, value: CachedRender) {
        let mut inner = self.inner.lock();
        inner.failures.remove(&key);
        inner.entries.put(key, value);
    }

    pub fn has_in_flight(&self, key: &RenderKey) -> bool {
        self.inner.lock().in_flight.contains_key(key)
    }

    /// Set the in-flight marker for a key, returning the token it was issued
    pub fn mark_in_flight(&self, key: &RenderKey) -> u64 {
        let mut inner = self.inner.lock();
        let token = inner.issue_token(key);
        inner.in_flight.insert(key.clone(), token);
        token
    }

    pub fn clear_in_flight(&self, key: &RenderKey) {
        self.inner.lock().in_flight.remove(key);
        self.settled.notify_waiters();
    }

    /// Wait until no render is in flight for `key`
    ///
    /// Returns immediately when nothing is running. The caller should
    /// re-check the cache afterwards: the render may have failed, been
    /// dropped, or been invalidated.
    pub async fn wait_for(&self, key: &RenderKey) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed
            notified.as_mut().enable();

            if !self.has_in_flight(key) {
                return;
            }
            notified.await;
        }
    }

    /// Atomically claim the render for `key` unless it is cached, running,
    /// or terminally failed
    pub fn try_begin(self: &Arc<Self>, key: RenderKey) -> BeginOutcome {
        let mut inner = self.inner.lock();

        if inner.entries.contains(&key) {
            return BeginOutcome::Cached;
        }
        if inner.in_flight.contains_key(&key) {
            return BeginOutcome::InFlight;
        }
        if inner.failures.get(&key).is_some_and(|f| f.terminal) {
            return BeginOutcome::Failed;
        }

        let token = inner.issue_token(&key);
        inner.in_flight.insert(key.clone(), token);
        drop(inner);

        BeginOutcome::Started(InFlightGuard {
            cache: Arc::clone(self),
            key,
            token,
            armed: true,
        })
    }

    /// Drop cached output, failure history and the in-flight marker for a key
    ///
    /// A render still running for the key keeps going but its result is
    /// discarded on completion.
    pub fn invalidate(&self, key: &RenderKey) {
        let mut inner = self.inner.lock();
        inner.entries.pop(key);
        inner.failures.remove(key);
        inner.in_flight.remove(key);
        inner.issue_token(key);
        drop(inner);
        self.settled.notify_waiters();
    }

    /// Drop every render of a document: thumbnails and page sequences at
    /// every scale
    ///
    /// Renders still running for the document are discarded on completion.
    /// Returns the number of cached entries removed.
    pub fn invalidate_id(&self, id: &DocId) -> usize {
        let mut inner = self.inner.lock();

        let mut keys: HashSet<RenderKey> = inner
            .latest
            .keys()
            .chain(inner.in_flight.keys())
            .chain(inner.failures.keys())
            .filter(|key| &key.id == id)
            .cloned()
            .collect();
        keys.extend(
            inner
                .entries
                .iter()
                .map(|(key, _)| key)
                .filter(|key| &key.id == id)
                .cloned(),
        );

        let mut evicted = 0;
        for key in &keys {
            if inner.entries.pop(key).is_some() {
                evicted += 1;
            }
            inner.failures.remove(key);
            inner.in_flight.remove(key);
            inner.issue_token(key);
        }
        drop(inner);

        self.settled.notify_waiters();
        evicted
    }

    /// Drop everything (outstanding renders are discarded on completion)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.in_flight.clear();
        inner.latest.clear();
        inner.failures.clear();
        drop(inner);
        self.settled.notify_waiters();
    }

    /// Observable state of a key
    pub fn status(&self, key: &RenderKey) -> RenderStatus {
        let inner = self.inner.lock();
        if inner.entries.contains(key) {
            RenderStatus::Ready
        } else if inner.in_flight.contains_key(key) {
            RenderStatus::Loading
        } else if let Some(failure) = inner.failures.get(key) {
            RenderStatus::Failed {
                attempts: failure.attempts,
                terminal: failure.terminal,
            }
        } else {
            RenderStatus::Absent
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            in_flight: inner.in_flight.len(),
            failures: inner.failures.len(),
            capacity: self.capacity.map(NonZeroUsize::get),
        }
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Ownership of one in-flight render
///
/// Consumed by [`complete`](Self::complete) or [`fail`](Self::fail). If it is
/// dropped instead (error path, panic, aborted task) the in-flight marker is
/// still released.
#[derive(Debug)]
pub struct InFlightGuard {
    cache: Arc<RenderCache>,
    key: RenderKey,
    token: u64,
    armed: bool,
}

impl InFlightGuard {
    pub fn key(&self) -> &RenderKey {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// Store the output if this render is still the latest for its key
    ///
    /// Returns `false` when the result was stale and discarded.
    pub fn complete(mut self, value: CachedRender) -> bool {
        self.armed = false;
        let mut inner = self.cache.inner.lock();

        let current = inner.is_latest(&self.key, self.token);
        if current {
            inner.failures.remove(&self.key);
            inner.entries.put(self.key.clone(), value);
        }
        inner.release(&self.key, self.token);
        drop(inner);

        self.cache.settled.notify_waiters();
        current
    }

    /// Record a failed attempt and release the marker
    pub fn fail(mut self, policy: &RetryPolicy) -> RenderStatus {
        self.armed = false;
        let mut inner = self.cache.inner.lock();

        if inner.is_latest(&self.key, self.token) {
            let record = inner.failures.entry(self.key.clone()).or_default();
            record.attempts += 1;
            record.terminal = policy.is_exhausted(record.attempts);
        }
        inner.release(&self.key, self.token);

        let status = match inner.failures.get(&self.key) {
            Some(record) => RenderStatus::Failed {
                attempts: record.attempts,
                terminal: record.terminal,
            },
            None => RenderStatus::Absent,
        };
        drop(inner);

        self.cache.settled.notify_waiters();
        status
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.cache.inner.lock().release(&self.key, self.token);
            self.cache.settled.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: u8) -> CachedRender {
        CachedRender::Thumbnail(RenderedImage::new(vec![tag], 1, 1))
    }

    fn started(outcome: BeginOutcome) -> InFlightGuard {
        match outcome {
            BeginOutcome::Started(guard) => guard,
            other => panic!("expected Started, got {:?}", other),
        }
    }

    #[test]
    fn test_get_put_roundtrip() {
        let cache = RenderCache::unbounded();
        let key = RenderKey::thumbnail("1");

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), image(1));
        assert_eq!(cache.get(&key), Some(image(1)));
        cache.put(key.clone(), image(2));
        assert_eq!(cache.get(&key), Some(image(2)));
        assert_eq!(cache.status(&key), RenderStatus::Ready);
    }

    #[test]
    fn test_manual_in_flight_markers() {
        let cache = RenderCache::unbounded();
        let key = RenderKey::thumbnail("1");

        assert!(!cache.has_in_flight(&key));
        let first = cache.mark_in_flight(&key);
        let second = cache.mark_in_flight(&key);
        assert!(second > first);
        assert!(cache.has_in_flight(&key));
        assert_eq!(cache.status(&key), RenderStatus::Loading);

        cache.clear_in_flight(&key);
        assert!(!cache.has_in_flight(&key));
    }

    #[test]
    fn test_try_begin_is_single_flight() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("9");

        let guard = started(cache.try_begin(key.clone()));
        assert!(matches!(cache.try_begin(key.clone()), BeginOutcome::InFlight));

        assert!(guard.complete(image(9)));
        assert!(matches!(cache.try_begin(key.clone()), BeginOutcome::Cached));
        assert!(!cache.has_in_flight(&key));
    }

    #[test]
    fn test_dropped_guard_releases_marker() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("3");

        {
            let _guard = started(cache.try_begin(key.clone()));
            assert!(cache.has_in_flight(&key));
        }

        assert!(!cache.has_in_flight(&key));
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.status(&key), RenderStatus::Absent);
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("4");

        let slow = started(cache.try_begin(key.clone()));
        cache.invalidate(&key);
        let fast = started(cache.try_begin(key.clone()));

        assert!(fast.complete(image(2)));
        assert!(!slow.complete(image(1)));
        assert_eq!(cache.get(&key), Some(image(2)));
        assert!(!cache.has_in_flight(&key));
    }

    #[test]
    fn test_stale_guard_does_not_release_newer_marker() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("5");

        let slow = started(cache.try_begin(key.clone()));
        cache.invalidate(&key);
        let _fresh = started(cache.try_begin(key.clone()));

        drop(slow);
        assert!(cache.has_in_flight(&key));
    }

    #[test]
    fn test_retry_cap_turns_terminal() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("2");
        let policy = RetryPolicy { max_attempts: 2 };

        let status = started(cache.try_begin(key.clone())).fail(&policy);
        assert_eq!(status, RenderStatus::Failed { attempts: 1, terminal: false });

        let status = started(cache.try_begin(key.clone())).fail(&policy);
        assert_eq!(status, RenderStatus::Failed { attempts: 2, terminal: true });
        assert!(matches!(cache.try_begin(key.clone()), BeginOutcome::Failed));

        cache.invalidate(&key);
        assert!(matches!(cache.try_begin(key.clone()), BeginOutcome::Started(_)));
    }

    #[test]
    fn test_unlimited_retry_never_terminal() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("2");

        for _ in 0..10 {
            started(cache.try_begin(key.clone())).fail(&RetryPolicy::unlimited());
        }
        assert_eq!(
            cache.status(&key),
            RenderStatus::Failed { attempts: 10, terminal: false }
        );
    }

    #[test]
    fn test_bounded_cache_evicts_oldest_write() {
        let cache = RenderCache::with_capacity(2);
        for id in ["1", "2", "3"] {
            cache.put(RenderKey::thumbnail(id), image(0));
        }

        assert!(cache.get(&RenderKey::thumbnail("1")).is_none());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().capacity, Some(2));
        assert_eq!(RenderCache::with_capacity(0).stats().capacity, None);
    }

    #[test]
    fn test_clear_discards_outstanding_render() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("6");

        let guard = started(cache.try_begin(key.clone()));
        cache.clear();
        assert!(!guard.complete(image(6)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_id_drops_every_render_of_a_document() {
        let cache = Arc::new(RenderCache::unbounded());
        let pages = |scale: f32| RenderKey::pages("7", scale);
        let pages_value = CachedRender::Pages(Arc::new(vec![]));

        cache.put(RenderKey::thumbnail("7"), image(7));
        cache.put(pages(1.5), pages_value.clone());
        cache.put(pages(2.0), pages_value.clone());
        cache.put(RenderKey::thumbnail("8"), image(8));
        let running = started(cache.try_begin(pages(3.0)));

        assert_eq!(cache.invalidate_id(&DocId::from("7")), 3);

        assert!(cache.thumbnail(&DocId::from("7")).is_none());
        assert!(cache.get(&pages(1.5)).is_none());
        assert!(cache.get(&pages(2.0)).is_none());
        assert!(!cache.has_in_flight(&pages(3.0)));
        // The render that was running when the document changed is stale
        assert!(!running.complete(pages_value));
        assert!(cache.get(&pages(3.0)).is_none());
        // Other documents are untouched
        assert!(cache.thumbnail(&DocId::from("8")).is_some());
    }

    #[tokio::test]
    async fn test_wait_for_returns_when_render_settles() {
        let cache = Arc::new(RenderCache::unbounded());
        let key = RenderKey::thumbnail("9");

        // Nothing running: no wait
        cache.wait_for(&key).await;

        let guard = started(cache.try_begin(key.clone()));
        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache.wait_for(&key).await;
                cache.get(&key)
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert!(guard.complete(image(9)));
        let seen = waiter.await.unwrap();
        assert!(seen.is_some());
    }
}
