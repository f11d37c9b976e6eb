use crate::cache::{PreviewCache, DEFAULT_TTL};
use crate::extract::PreviewExtractor;
use crate::fetch::ContentFetcher;
use crate::redirect::RedirectResolver;
use crate::store::PreviewStore;
use crate::transport::{HttpTransport, ReqwestTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Time limit for a single fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(7);

const DEFAULT_USER_AGENT: &str = concat!("link-preview/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`PreviewService`]. Defaults match what the chat
/// client ships with: 7-day TTL, 7-second fetches, memory-only until a data
/// directory is provided.
pub struct PreviewServiceConfig {
    pub ttl: Duration,
    pub user_agent: String,
    pub timeout: Duration,
    pub data_dir: Option<PathBuf>,
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl Default for PreviewServiceConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: FETCH_TIMEOUT,
            data_dir: None,
            transport: None,
        }
    }
}

impl PreviewServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist positive previews under this directory (the application's
    /// private data directory). Without it the service runs memory-only.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    /// Substitute the HTTP transport. Used by tests; production code keeps
    /// the default reqwest transport.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

/// The link-preview and redirect-resolution service.
///
/// Both entry points are asynchronous, never fail, and de-duplicate
/// concurrent work per canonical URL. Cheap to clone; clones share the
/// caches.
#[derive(Clone)]
pub struct PreviewService {
    cache: PreviewCache,
    redirects: RedirectResolver,
}

impl Default for PreviewService {
    fn default() -> Self {
        Self::memory_only()
    }
}

impl PreviewService {
    /// A service without disk persistence.
    pub fn memory_only() -> Self {
        Self::new_with_config(PreviewServiceConfig::new())
    }

    /// A service persisting previews under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::new_with_config(PreviewServiceConfig::new().with_data_dir(data_dir))
    }

    pub fn new_with_config(config: PreviewServiceConfig) -> Self {
        let transport = config
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(config.timeout, &config.user_agent)));
        let store = config.data_dir.as_deref().map(PreviewStore::new);
        debug!(
            ttl_secs = config.ttl.as_secs(),
            persistent = store.is_some(),
            "Initializing preview service"
        );

        let cache = PreviewCache::new(
            ContentFetcher::new(Arc::clone(&transport)),
            PreviewExtractor::new(),
            store,
            config.ttl,
        );
        let redirects = RedirectResolver::new(transport);

        Self { cache, redirects }
    }

    /// Resolves a short human-readable description for `url`, or `None` when
    /// there is nothing to show. "Tried and failed" and "declined to try"
    /// are indistinguishable here.
    pub async fn resolve_preview(&self, url: &str) -> Option<String> {
        self.cache.resolve(url).await
    }

    /// Expands a known tracking redirect to its destination, or `None` for
    /// anything that is not one.
    pub async fn resolve_redirect(&self, url: &str) -> Option<String> {
        self.redirects.resolve(url).await
    }

    /// Resolves a batch concurrently. Coalescing still applies per URL, so
    /// duplicates in the batch cost one fetch.
    pub async fn resolve_previews(&self, urls: &[&str]) -> Vec<Option<String>> {
        futures::future::join_all(urls.iter().map(|url| self.resolve_preview(url))).await
    }

    /// Number of cached preview outcomes (positive and negative).
    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn cache_is_empty(&self) -> bool {
        self.cache.is_empty().await
    }

    /// Drops expired preview entries and rewrites the disk payload.
    pub async fn purge_expired(&self) {
        self.cache.purge_expired().await;
    }

    /// Forces a synchronous persistence pass. Call on shutdown; routine
    /// saves happen automatically after each positive resolution.
    pub async fn flush(&self) {
        self.cache.flush().await;
    }
}
