use crate::PreviewError;
use async_trait::async_trait;
use reqwest::header;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

/// What the service needs back from an HTTP exchange: the status, the
/// declared content type, the URL the client ended up at after redirects,
/// and the (possibly range-truncated) body bytes.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub final_url: String,
    pub body: Vec<u8>,
}

/// The HTTP seam the fetcher and redirect resolver run on.
///
/// The service only ever issues two shapes of request: a bounded GET with
/// optional `Accept`/`Range` headers, and a redirect-following HEAD probe.
/// Tests substitute a counting mock here; production uses
/// [`ReqwestTransport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        range: Option<&str>,
    ) -> Result<TransportResponse, PreviewError>;

    async fn head(&self, url: &str) -> Result<TransportResponse, PreviewError>;
}

/// Default transport over a pooled reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to create HTTP client");
                panic!("Failed to initialize HTTP client: {}", e);
            });
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn response_parts(response: &reqwest::Response) -> (u16, Option<String>, String) {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();
        (status, content_type, final_url)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        range: Option<&str>,
    ) -> Result<TransportResponse, PreviewError> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PreviewError::FetchError(e.to_string()))?;
        let (status, content_type, final_url) = Self::response_parts(&response);

        let body = response
            .bytes()
            .await
            .map_err(|e| PreviewError::FetchError(e.to_string()))?
            .to_vec();
        debug!(url = %url, status, body_len = body.len(), "GET completed");

        Ok(TransportResponse {
            status,
            content_type,
            final_url,
            body,
        })
    }

    async fn head(&self, url: &str) -> Result<TransportResponse, PreviewError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| PreviewError::FetchError(e.to_string()))?;
        let (status, content_type, final_url) = Self::response_parts(&response);
        debug!(url = %url, status, final_url = %final_url, "HEAD completed");

        Ok(TransportResponse {
            status,
            content_type,
            final_url,
            body: Vec::new(),
        })
    }
}
