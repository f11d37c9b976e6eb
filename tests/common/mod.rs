//! Shared test fixtures: a counting mock transport and temp-dir helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use link_preview::{
    HttpTransport, PreviewError, PreviewService, PreviewServiceConfig, TransportResponse,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub final_url: Option<String>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            final_url: None,
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn json(body: &str) -> Self {
        Self {
            status: 200,
            content_type: Some("application/json".to_string()),
            final_url: None,
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: None,
            final_url: None,
            body: Vec::new(),
        }
    }

    pub fn redirected_to(destination: &str) -> Self {
        Self {
            status: 200,
            content_type: None,
            final_url: Some(destination.to_string()),
            body: Vec::new(),
        }
    }
}

/// Routes are matched by URL prefix, first match wins; unmatched requests
/// get a 404. GET and HEAD are counted separately so tests can assert "zero
/// network calls" precisely.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<(String, MockResponse)>>,
    head_routes: Mutex<Vec<(String, MockResponse)>>,
    get_calls: AtomicUsize,
    head_calls: AtomicUsize,
    get_urls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every request sleeps first, so concurrent callers genuinely overlap.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn route(&self, prefix: &str, response: MockResponse) {
        self.routes
            .lock()
            .unwrap()
            .push((prefix.to_string(), response));
    }

    pub fn route_head(&self, prefix: &str, response: MockResponse) {
        self.head_routes
            .lock()
            .unwrap()
            .push((prefix.to_string(), response));
    }

    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn get_urls(&self) -> Vec<String> {
        self.get_urls.lock().unwrap().clone()
    }

    fn respond(routes: &Mutex<Vec<(String, MockResponse)>>, url: &str) -> Option<MockResponse> {
        routes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
    }

    fn finish(url: &str, response: Option<MockResponse>) -> TransportResponse {
        let response = response.unwrap_or_else(MockResponse::not_found);
        TransportResponse {
            status: response.status,
            content_type: response.content_type,
            final_url: response.final_url.unwrap_or_else(|| url.to_string()),
            body: response.body,
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(
        &self,
        url: &str,
        _accept: Option<&str>,
        _range: Option<&str>,
    ) -> Result<TransportResponse, PreviewError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.get_urls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = Self::respond(&self.routes, url);
        Ok(Self::finish(url, response))
    }

    async fn head(&self, url: &str) -> Result<TransportResponse, PreviewError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response =
            Self::respond(&self.head_routes, url).or_else(|| Self::respond(&self.routes, url));
        Ok(Self::finish(url, response))
    }
}

pub fn service_over(transport: Arc<MockTransport>) -> PreviewService {
    PreviewService::new_with_config(PreviewServiceConfig::new().with_transport(transport))
}

pub fn temp_data_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    std::env::temp_dir().join(format!(
        "link-preview-{label}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}
