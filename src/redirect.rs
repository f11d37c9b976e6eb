//! Tracking-redirect expansion.
//!
//! A narrower sibling of the preview cache: same canonicalize-first,
//! never-throwing, coalescing shape, but memory-only. A resolved redirect is
//! assumed stable for the process lifetime, so entries carry no TTL.

use crate::cache::SharedOutcome;
use crate::canonical::canonicalize;
use crate::transport::HttpTransport;
use crate::PreviewError;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

struct ResolverState {
    resolved: HashMap<String, Option<String>>,
    in_flight: HashMap<String, SharedOutcome>,
}

#[derive(Clone)]
pub struct RedirectResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    state: Mutex<ResolverState>,
    transport: Arc<dyn HttpTransport>,
}

/// Only known indirection hosts are ever probed: Bing result redirects and
/// Outlook SafeLinks wrappers. Everything else returns `None` without a
/// network call.
fn is_known_redirector(url: &url::Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    if (host == "bing.com" || host.ends_with(".bing.com")) && url.path().starts_with("/ck/") {
        return true;
    }
    host.ends_with(".safelinks.protection.outlook.com")
}

impl RedirectResolver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                state: Mutex::new(ResolverState {
                    resolved: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
                transport,
            }),
        }
    }

    /// Expands a tracking redirect to its destination URL. Returns `None`
    /// for non-allowlisted hosts, unresolvable URLs, and probes that do not
    /// move.
    pub async fn resolve(&self, raw_url: &str) -> Option<String> {
        let canonical = canonicalize(raw_url)?;
        let parsed = url::Url::parse(&canonical).ok()?;
        if !is_known_redirector(&parsed) {
            return None;
        }

        let outcome = {
            let mut state = self.inner.state.lock().await;

            if let Some(resolved) = state.resolved.get(&canonical) {
                debug!(url = %canonical, "Redirect cache hit");
                return resolved.clone();
            }

            if let Some(shared) = state.in_flight.get(&canonical) {
                debug!(url = %canonical, "Joining in-flight redirect probe");
                shared.clone()
            } else {
                let task = tokio::spawn(ResolverInner::probe_and_record(
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
}

impl ResolverInner {
    async fn probe_and_record(self: Arc<Self>, canonical: String) -> Option<String> {
        let destination = match self.probe(&canonical).await {
            Ok(destination) => destination,
            Err(e) => {
                e.log();
                None
            }
        };

        let mut state = self.state.lock().await;
        state
            .resolved
            .insert(canonical.clone(), destination.clone());
        state.in_flight.remove(&canonical);
        destination
    }

    /// HEAD first, letting the client follow redirects; if the final URL
    /// did not move, retry with a one-byte GET for hosts that only redirect
    /// on GET. Comparison is case-insensitive.
    async fn probe(&self, canonical: &str) -> Result<Option<String>, PreviewError> {
        let head = self.transport.head(canonical).await?;
        if !head.final_url.eq_ignore_ascii_case(canonical) {
            return Ok(Some(head.final_url));
        }

        let get = self
            .transport
            .get(canonical, None, Some("bytes=0-0"))
            .await?;
        if !get.final_url.eq_ignore_ascii_case(canonical) {
            return Ok(Some(get.final_url));
        }
        Ok(None)
    }
}
