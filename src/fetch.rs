use crate::transport::HttpTransport;
use crate::PreviewError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Response bodies are range-capped to this many bytes; servers that ignore
/// the range header get truncated client-side.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub(crate) const HTML_ACCEPT: &str = "text/html,application/xhtml+xml";

const OEMBED_ENDPOINT: &str = "https://publish.twitter.com/oembed";

/// Path extensions that can never yield a text preview. Rejected before any
/// network call is issued.
const BLOCKED_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "svg", "tif", "tiff", "heic", "avif",
    // archives
    "zip", "gz", "tgz", "tar", "bz2", "xz", "7z", "rar", "dmg", "iso",
    // audio
    "mp3", "wav", "ogg", "oga", "flac", "m4a", "aac", "opus",
    // video
    "mp4", "m4v", "mkv", "avi", "mov", "webm", "wmv", "mpeg", "mpg",
];

#[derive(Debug, Clone, Deserialize)]
pub struct OEmbedPayload {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: String,
}

#[derive(Debug, Clone)]
pub enum FetchResult {
    Html(String),
    OEmbed(OEmbedPayload),
}

/// A social-post URL rewritten to its canonical `https://x.com/...` status
/// form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusUrl {
    pub canonical: String,
}

impl StatusUrl {
    /// Matches x.com/twitter.com (and subdomain) status paths:
    /// `/<user>/status/<id>`, `/i/status/<id>`, `/i/web/status/<id>`.
    /// Tokens match case-insensitively, the id must be numeric.
    pub fn detect(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let social_host = ["x.com", "twitter.com"]
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")));
        if !social_host {
            return None;
        }

        let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
        let canonical_path = match segments.as_slice() {
            [user, status, id] if status.eq_ignore_ascii_case("status") && is_numeric_id(id) => {
                format!("/{user}/status/{id}")
            }
            [i, web, status, id]
                if i.eq_ignore_ascii_case("i")
                    && web.eq_ignore_ascii_case("web")
                    && status.eq_ignore_ascii_case("status")
                    && is_numeric_id(id) =>
            {
                format!("/i/web/status/{id}")
            }
            _ => return None,
        };

        Some(Self {
            canonical: format!("https://x.com{canonical_path}"),
        })
    }
}

fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

/// Bounded, timed content fetching. Routes social status URLs to the oEmbed
/// endpoint and everything else through a range-capped HTML GET.
#[derive(Clone)]
pub struct ContentFetcher {
    transport: Arc<dyn HttpTransport>,
    max_body_bytes: usize,
}

impl ContentFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchResult, PreviewError> {
        if let Some(status_url) = StatusUrl::detect(url) {
            debug!(url = %url, "Detected social status URL, using oEmbed endpoint");
            let payload = self.fetch_oembed(&status_url).await?;
            return Ok(FetchResult::OEmbed(payload));
        }
        let html = self.fetch_html(url).await?;
        Ok(FetchResult::Html(html))
    }

    async fn fetch_html(&self, url: &str) -> Result<String, PreviewError> {
        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(PreviewError::SchemeNotAllowed(scheme.to_string())),
        }
        if let Some(extension) = blocked_extension(&parsed) {
            return Err(PreviewError::BlockedExtension(extension));
        }

        let range = format!("bytes=0-{}", self.max_body_bytes - 1);
        let response = self
            .transport
            .get(url, Some(HTML_ACCEPT), Some(&range))
            .await?;
        if !(200..400).contains(&response.status) {
            return Err(PreviewError::StatusError(response.status));
        }
        if let Some(content_type) = &response.content_type {
            if !is_html_content_type(content_type) {
                return Err(PreviewError::InvalidContentType(content_type.clone()));
            }
        }

        let mut body = response.body;
        body.truncate(self.max_body_bytes);
        Ok(decode_body(body))
    }

    async fn fetch_oembed(&self, status_url: &StatusUrl) -> Result<OEmbedPayload, PreviewError> {
        let endpoint = Url::parse_with_params(
            OEMBED_ENDPOINT,
            &[
                ("url", status_url.canonical.as_str()),
                ("omit_script", "1"),
                ("lang", "en"),
            ],
        )?;

        let response = self
            .transport
            .get(endpoint.as_str(), Some("application/json"), None)
            .await?;
        if !(200..400).contains(&response.status) {
            return Err(PreviewError::StatusError(response.status));
        }

        serde_json::from_slice(&response.body).map_err(|e| PreviewError::OEmbedError(e.to_string()))
    }
}

fn blocked_extension(url: &Url) -> Option<String> {
    let last_segment = url.path().rsplit('/').next()?;
    let (_, extension) = last_segment.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    if BLOCKED_EXTENSIONS.contains(&extension.as_str()) {
        Some(extension)
    } else {
        None
    }
}

/// A declared content type counts as HTML unless it names `json` or `xml`.
/// The xhtml type we advertise in `Accept` also names `xml`, so anything
/// naming `html` passes first.
fn is_html_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if essence.contains("html") {
        return true;
    }
    !(essence.contains("json") || essence.contains("xml"))
}

/// UTF-8 with Latin-1 fallback. The buffer may be truncated mid-sequence by
/// the range cap, in which case the fallback still yields usable text.
fn decode_body(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}
