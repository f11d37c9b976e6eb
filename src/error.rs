use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Scheme is not fetchable: {0}")]
    SchemeNotAllowed(String),

    #[error("File extension is blocked: {0}")]
    BlockedExtension(String),

    #[error("Failed to fetch content: {0}")]
    FetchError(String),

    #[error("Unacceptable HTTP status: {0}")]
    StatusError(u16),

    #[error("Content type is not HTML: {0}")]
    InvalidContentType(String),

    #[error("Malformed oEmbed payload: {0}")]
    OEmbedError(String),

    #[error("No usable preview candidate")]
    NoCandidate,

    #[error("Cache store error: {0}")]
    StoreError(String),
}

impl PreviewError {
    /// Logs the error at the level its variant warrants. Every public entry
    /// point collapses errors to `None`, so this is the only place they
    /// become visible.
    pub fn log(&self) {
        match self {
            PreviewError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            PreviewError::SchemeNotAllowed(scheme) => {
                debug!(scheme = %scheme, "Skipping non-HTTP URL");
            }
            PreviewError::BlockedExtension(ext) => {
                debug!(extension = %ext, "Skipping URL with blocked extension");
            }
            PreviewError::FetchError(e) => {
                error!(error = %e, "Content fetch failed");
            }
            PreviewError::StatusError(status) => {
                debug!(status = %status, "Rejected response status");
            }
            PreviewError::InvalidContentType(ct) => {
                debug!(content_type = %ct, "Rejected non-HTML content type");
            }
            PreviewError::OEmbedError(e) => {
                warn!(error = %e, "oEmbed payload was unusable");
            }
            PreviewError::NoCandidate => {
                debug!("Extractor found no usable candidate");
            }
            PreviewError::StoreError(e) => {
                warn!(error = %e, "Cache store operation failed");
            }
        }
    }
}
