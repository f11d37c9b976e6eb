use crate::cache::CacheEntry;
use crate::PreviewError;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DISK_FORMAT_VERSION: u32 = 1;

/// File name inside the application's data directory.
pub const CACHE_FILE_NAME: &str = "link_previews.json";

/// Unix seconds at 2000-01-01T00:00:00Z. A legacy float below this cannot be
/// a plausible fetch time in Unix seconds, so it is read as seconds since
/// the 2001 reference epoch instead.
const UNIX_SECONDS_AT_2000: f64 = 946_684_800.0;

/// Unix seconds at 2001-01-01T00:00:00Z, the reference date older installs
/// measured `fetchedAt` from.
const REFERENCE_EPOCH_UNIX_SECONDS: i64 = 978_307_200;

#[derive(Debug, Serialize)]
struct DiskPayload<'a> {
    version: u32,
    entries: HashMap<&'a str, DiskEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct DiskEntry<'a> {
    #[serde(rename = "previewText")]
    preview_text: &'a str,
    #[serde(rename = "fetchedAt")]
    fetched_at: i64,
}

#[derive(Debug, Deserialize)]
struct LegacyPayload {
    version: u32,
    #[serde(default)]
    entries: HashMap<String, LegacyEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(rename = "previewText")]
    preview_text: String,
    #[serde(rename = "fetchedAt")]
    fetched_at: LegacyTimestamp,
}

/// Read-compatibility shim for the `fetchedAt` encodings that exist in the
/// wild: integers and floats (Unix or reference-epoch seconds) and RFC-3339
/// strings. New writes always emit integer Unix seconds.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyTimestamp {
    Seconds(f64),
    Text(String),
}

impl LegacyTimestamp {
    fn to_unix_seconds(&self) -> Option<i64> {
        match self {
            LegacyTimestamp::Seconds(seconds) if seconds.is_finite() => {
                if *seconds < UNIX_SECONDS_AT_2000 {
                    Some(REFERENCE_EPOCH_UNIX_SECONDS + *seconds as i64)
                } else {
                    Some(*seconds as i64)
                }
            }
            LegacyTimestamp::Seconds(_) => None,
            LegacyTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|timestamp| timestamp.timestamp()),
        }
    }
}

/// One JSON document per installation holding the positive, unexpired
/// preview results.
#[derive(Debug, Clone)]
pub struct PreviewStore {
    path: PathBuf,
}

impl PreviewStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CACHE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads persisted entries, dropping anything expired or unreadable.
    /// Every failure mode (missing file, permission error, corrupt JSON,
    /// version mismatch) yields an empty map; the cache then runs
    /// memory-only.
    pub fn load(&self, ttl: Duration, now: i64) -> HashMap<String, CacheEntry> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No preview cache file yet");
                return HashMap::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read preview cache");
                return HashMap::new();
            }
        };

        let payload: LegacyPayload = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Preview cache is corrupt, starting empty");
                return HashMap::new();
            }
        };
        if payload.version != DISK_FORMAT_VERSION {
            warn!(
                version = payload.version,
                "Unknown preview cache version, starting empty"
            );
            return HashMap::new();
        }

        let mut entries = HashMap::new();
        for (url, entry) in payload.entries {
            let Some(fetched_at) = entry.fetched_at.to_unix_seconds() else {
                continue;
            };
            if entry.preview_text.is_empty() {
                continue;
            }
            if now.saturating_sub(fetched_at) > ttl.as_secs() as i64 {
                continue;
            }
            entries.insert(
                url,
                CacheEntry {
                    preview_text: Some(entry.preview_text),
                    fetched_at,
                },
            );
        }
        debug!(count = entries.len(), "Loaded preview cache");
        entries
    }

    /// Rewrites the payload with the unexpired positive entries. Negative
    /// results never reach disk. The write goes through a sibling temp file
    /// so a crash cannot leave a half-written document.
    pub fn save(
        &self,
        entries: &HashMap<String, CacheEntry>,
        ttl: Duration,
        now: i64,
    ) -> Result<(), PreviewError> {
        let disk_entries: HashMap<&str, DiskEntry> = entries
            .iter()
            .filter_map(|(url, entry)| {
                let text = entry.preview_text.as_deref()?;
                if text.is_empty() {
                    return None;
                }
                if now.saturating_sub(entry.fetched_at) > ttl.as_secs() as i64 {
                    return None;
                }
                Some((
                    url.as_str(),
                    DiskEntry {
                        preview_text: text,
                        fetched_at: entry.fetched_at,
                    },
                ))
            })
            .collect();

        let payload = DiskPayload {
            version: DISK_FORMAT_VERSION,
            entries: disk_entries,
        };
        let json =
            serde_json::to_string(&payload).map_err(|e| PreviewError::StoreError(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PreviewError::StoreError(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| PreviewError::StoreError(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| PreviewError::StoreError(e.to_string()))?;
        Ok(())
    }
}
