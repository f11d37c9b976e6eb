//! Link-preview and redirect-resolution service for chat applications.
//!
//! Given a raw URL seen in search results, [`PreviewService::resolve_preview`]
//! produces a short human-readable description and
//! [`PreviewService::resolve_redirect`] expands known tracking redirects to
//! their destination. Both guarantee at most one network fetch per canonical
//! URL across concurrent callers, bound network and parsing cost, and never
//! surface errors: anything that goes wrong is indistinguishable from
//! "nothing to show". Positive previews persist to a versioned JSON file
//! with a 7-day expiry; redirects live for the process lifetime only.

mod cache;
mod canonical;
mod error;
mod extract;
mod fetch;
mod logging;
mod redirect;
mod service;
mod store;
mod transport;

pub use cache::{CacheEntry, PreviewCache, DEFAULT_TTL};
pub use canonical::canonicalize;
pub use error::PreviewError;
pub use extract::{PreviewExtractor, MAX_PREVIEW_CHARS};
pub use fetch::{ContentFetcher, FetchResult, OEmbedPayload, MAX_BODY_BYTES};
#[cfg(feature = "logging")]
pub use logging::{setup_logging, LogConfig};
pub use redirect::RedirectResolver;
pub use service::{PreviewService, PreviewServiceConfig, FETCH_TIMEOUT};
pub use store::{PreviewStore, CACHE_FILE_NAME, DISK_FORMAT_VERSION};
pub use transport::{HttpTransport, ReqwestTransport, TransportResponse};

/// True when the URL is a social status link that will be resolved through
/// the oEmbed endpoint instead of a generic HTML fetch.
pub fn is_status_url(url: &str) -> bool {
    fetch::StatusUrl::detect(url).is_some()
}
