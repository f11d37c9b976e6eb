use url::Url;

/// Normalizes a raw URL string into the canonical form used as the single
/// cache and de-duplication key.
///
/// Two raw strings that canonicalize identically share one cache slot, so
/// the steps here are deliberately conservative:
/// 1. Trim surrounding whitespace
/// 2. Reject anything that is not http(s)
/// 3. Lowercase the host (done by the `url` parser)
/// 4. Strip the fragment
/// 5. Keep the query string intact
///
/// Returns `None` for anything that cannot serve as a cache key.
pub fn canonicalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = Url::parse(trimmed).ok()?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }
    url.host_str()?;
    url.set_fragment(None);

    Some(url.into())
}
