//! The preview cache orchestrator.
//!
//! `resolve` canonicalizes the URL, serves fresh cache hits, evicts expired
//! entries, and otherwise joins or registers a fetch for the key. Lookup,
//! registration, and outcome writeback all happen under one lock; the fetch
//! itself runs as a spawned task outside it. Every concurrent caller for a
//! key awaits the same shared outcome, so at most one fetch per canonical
//! URL is ever outstanding.

use crate::canonical::canonicalize;
use crate::extract::PreviewExtractor;
use crate::fetch::{ContentFetcher, FetchResult};
use crate::store::PreviewStore;
use crate::PreviewError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Entries older than this are treated as absent and refetched.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One resolution outcome. A `None` preview text is a valid "nothing to
/// show" result: it is cached in memory so the URL is not refetched within
/// the TTL window, but it is never persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub preview_text: Option<String>,
    pub fetched_at: i64,
}

impl CacheEntry {
    pub(crate) fn is_fresh(&self, ttl: Duration, now: i64) -> bool {
        now.saturating_sub(self.fetched_at) <= ttl.as_secs() as i64
    }
}

pub(crate) type SharedOutcome = Shared<BoxFuture<'static, Option<String>>>;

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, SharedOutcome>,
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone)]
pub struct PreviewCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    state: Mutex<CacheState>,
    fetcher: ContentFetcher,
    extractor: PreviewExtractor,
    store: Option<Arc<PreviewStore>>,
    ttl: Duration,
}

impl PreviewCache {
    pub fn new(
        fetcher: ContentFetcher,
        extractor: PreviewExtractor,
        store: Option<PreviewStore>,
        ttl: Duration,
    ) -> Self {
        let store = store.map(Arc::new);
        let entries = store
            .as_ref()
            .map(|store| store.load(ttl, unix_now()))
            .unwrap_or_default();
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    entries,
                    in_flight: HashMap::new(),
                }),
                fetcher,
                extractor,
                store,
                ttl,
            }),
        }
    }

    /// Resolves a preview for `raw_url`. Never fails: unnormalizable URLs,
    /// fetch errors, and empty extractions all collapse to `None`.
    pub async fn resolve(&self, raw_url: &str) -> Option<String> {
        let canonical = canonicalize(raw_url)?;

        let outcome = {
            let mut state = self.inner.state.lock().await;

            if let Some(entry) = state.entries.get(&canonical) {
                if entry.is_fresh(self.inner.ttl, unix_now()) {
                    debug!(url = %canonical, "Preview cache hit");
                    return entry.preview_text.clone();
                }
                debug!(url = %canonical, "Preview cache entry expired");
                state.entries.remove(&canonical);
            }

            if let Some(shared) = state.in_flight.get(&canonical) {
                debug!(url = %canonical, "Joining in-flight fetch");
                shared.clone()
            } else {
                // The fetch runs as its own task: a caller going away can
                // neither cancel it nor poison the outcome other waiters and
                // the cache observe.
                let task = tokio::spawn(CacheInner::fetch_and_record(
                    Arc::clone(&self.inner),
                    canonical.clone(),
                ));
                let shared: SharedOutcome =
                    async move { task.await.unwrap_or(None) }.boxed().shared();
                state.in_flight.insert(canonical.clone(), shared.clone());
                shared
            }
        };

        outcome.await
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.state.lock().await.entries.is_empty()
    }

    /// Drops expired entries eagerly and rewrites the disk payload. The same
    /// filter runs lazily on read and on every save; this just reclaims the
    /// memory sooner.
    pub async fn purge_expired(&self) {
        let now = unix_now();
        let mut state = self.inner.state.lock().await;
        let ttl = self.inner.ttl;
        state.entries.retain(|_, entry| entry.is_fresh(ttl, now));
        self.inner.schedule_save(&state.entries);
    }

    /// Synchronous persistence pass, for shutdown paths and tests.
    pub async fn flush(&self) {
        let Some(store) = self.inner.store.clone() else {
            return;
        };
        let snapshot = { self.inner.state.lock().await.entries.clone() };
        let ttl = self.inner.ttl;
        let result =
            tokio::task::spawn_blocking(move || store.save(&snapshot, ttl, unix_now())).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => e.log(),
            Err(e) => warn!(error = %e, "Flush task failed"),
        }
    }
}

impl CacheInner {
    async fn fetch_and_record(self: Arc<Self>, canonical: String) -> Option<String> {
        let preview_text = match self.fetch_preview(&canonical).await {
            Ok(text) => text,
            Err(e) => {
                e.log();
                None
            }
        };

        let entry = CacheEntry {
            preview_text: preview_text.clone(),
            fetched_at: unix_now(),
        };
        let mut state = self.state.lock().await;
        state.entries.insert(canonical.clone(), entry);
        state.in_flight.remove(&canonical);
        if preview_text.is_some() {
            self.schedule_save(&state.entries);
        }
        preview_text
    }

    async fn fetch_preview(&self, canonical: &str) -> Result<Option<String>, PreviewError> {
        let fetched = self.fetcher.fetch(canonical).await?;
        let preview = match fetched {
            FetchResult::Html(html) => self.extractor.extract(&html),
            FetchResult::OEmbed(payload) => self.extractor.extract_from_oembed(&payload),
        };
        Ok(preview)
    }

    /// Fire-and-forget rewrite of the disk payload. Failures are logged and
    /// swallowed; the cache keeps serving from memory.
    fn schedule_save(&self, entries: &HashMap<String, CacheEntry>) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let snapshot = entries.clone();
        let ttl = self.ttl;
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.save(&snapshot, ttl, unix_now()) {
                e.log();
            }
        });
    }
}
