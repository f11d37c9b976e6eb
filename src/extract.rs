use crate::fetch::OEmbedPayload;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// Upper bound on returned preview text, in characters. Longer winners are
/// ellipsis-truncated.
pub const MAX_PREVIEW_CHARS: usize = 420;

/// Meta keys in priority order. The index feeds the base score, so
/// `og:description` outranks a plain `description` of similar length.
const META_KEYS: &[&str] = &[
    "og:description",
    "twitter:description",
    "description",
    "dc.description",
    "sailthru.description",
];

const META_BASE_SCORE: i64 = 620;
const META_PRIORITY_STEP: i64 = 24;
const JSON_LD_BASE_SCORE: i64 = 540;
const PARAGRAPH_BASE_SCORE: i64 = 500;
const TITLE_BASE_SCORE: i64 = 180;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());

static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());

static FIRST_PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").unwrap());

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#(x[0-9a-f]{1,6}|[0-9]{1,7});").unwrap());

/// Where a candidate came from. Meta carries its priority index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateSource {
    Meta(usize),
    JsonLd,
    Paragraph,
    Title,
}

/// A scored text fragment. Produced and consumed entirely within one
/// extraction call.
#[derive(Debug)]
struct Candidate {
    text: String,
    source: CandidateSource,
    score: i64,
}

/// Extracts the best short description from an HTML document.
///
/// Pure: no I/O, no state. Candidates are collected from meta tags, JSON-LD,
/// the first paragraph, and the title, each scored by source and length; the
/// maximum wins, first-seen on ties.
#[derive(Clone, Default)]
pub struct PreviewExtractor;

impl PreviewExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let mut candidates = Vec::new();

        for (index, content) in meta_values(&document) {
            push_candidate(&mut candidates, &content, CandidateSource::Meta(index));
        }
        if let Some(text) = json_ld_text(&document) {
            push_candidate(&mut candidates, &text, CandidateSource::JsonLd);
        }
        if let Some(text) = first_paragraph(html) {
            push_candidate(&mut candidates, &text, CandidateSource::Paragraph);
        }
        if let Some(text) = title_text(&document) {
            push_candidate(&mut candidates, &text, CandidateSource::Title);
        }

        // Strictly-greater comparison over the fixed evaluation order above:
        // ties go to the earlier candidate.
        let winner = candidates
            .into_iter()
            .reduce(|best, next| if next.score > best.score { next } else { best })?;
        debug!(source = ?winner.source, score = winner.score, "Selected preview candidate");
        Some(truncate_preview(&winner.text))
    }

    /// Builds a preview from an oEmbed payload: the embed HTML fragment goes
    /// through the regular extraction, with the plain title as fallback.
    pub fn extract_from_oembed(&self, payload: &OEmbedPayload) -> Option<String> {
        if !payload.html.is_empty() {
            if let Some(text) = self.extract(&payload.html) {
                return Some(text);
            }
        }
        normalize_candidate(&payload.title).map(|title| truncate_preview(&title))
    }
}

fn push_candidate(candidates: &mut Vec<Candidate>, raw: &str, source: CandidateSource) {
    // Empty after normalization means not a candidate at all.
    let Some(text) = normalize_candidate(raw) else {
        return;
    };
    let base = match source {
        CandidateSource::Meta(index) => META_BASE_SCORE - META_PRIORITY_STEP * index as i64,
        CandidateSource::JsonLd => JSON_LD_BASE_SCORE,
        CandidateSource::Paragraph => PARAGRAPH_BASE_SCORE,
        CandidateSource::Title => TITLE_BASE_SCORE,
    };
    let score = base + length_bonus(&text);
    candidates.push(Candidate {
        text,
        source,
        score,
    });
}

/// Longer, wordier candidates win within a source tier:
/// `min(chars, 420) + min(words * 8, 120)`.
fn length_bonus(text: &str) -> i64 {
    let chars = text.chars().count() as i64;
    let words = text.split_whitespace().count() as i64;
    chars.min(MAX_PREVIEW_CHARS as i64) + (words * 8).min(120)
}

/// Meta tag contents keyed by priority index, first match per key wins.
/// Keys are matched case-insensitively against `property`, `name`, and
/// `itemprop`.
fn meta_values(document: &Html) -> Vec<(usize, String)> {
    let Ok(selector) = Selector::parse("meta") else {
        return Vec::new();
    };
    let mut found: Vec<Option<String>> = vec![None; META_KEYS.len()];

    for element in document.select(&selector) {
        for attr in ["property", "name", "itemprop"] {
            let Some(key) = element.value().attr(attr) else {
                continue;
            };
            let Some(index) = META_KEYS
                .iter()
                .position(|candidate| candidate.eq_ignore_ascii_case(key.trim()))
            else {
                continue;
            };
            if found[index].is_some() {
                continue;
            }
            if let Some(content) = element.value().attr("content") {
                found[index] = Some(content.to_string());
            }
        }
    }

    found
        .into_iter()
        .enumerate()
        .filter_map(|(index, content)| content.map(|text| (index, text)))
        .collect()
}

/// First `description` or `headline` string in any JSON-LD block, searched
/// depth-first through nested objects and arrays.
fn json_ld_text(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        if let Ok(value) = serde_json::from_str::<Value>(&raw) {
            if let Some(text) = find_json_ld_text(&value) {
                return Some(text);
            }
        }
    }
    None
}

fn find_json_ld_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in ["description", "headline"] {
                if let Some(Value::String(text)) = map.get(key) {
                    if !text.trim().is_empty() {
                        return Some(text.clone());
                    }
                }
            }
            map.values().find_map(find_json_ld_text)
        }
        Value::Array(items) => items.iter().find_map(find_json_ld_text),
        _ => None,
    }
}

/// Inner text of the first `<p>` element, with `<script>`/`<style>` blocks
/// removed beforehand so boilerplate inside them cannot masquerade as body
/// text.
fn first_paragraph(html: &str) -> Option<String> {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let without_styles = STYLE_RE.replace_all(&without_scripts, " ");
    FIRST_PARAGRAPH_RE
        .captures(&without_styles)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

fn title_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
}

/// Tag strip, entity decode, whitespace collapse. Empty output means the
/// input was not usable as a candidate.
fn normalize_candidate(raw: &str) -> Option<String> {
    let stripped = TAG_RE.replace_all(raw, " ");
    let decoded = decode_numeric_entities(&decode_named_entities(&stripped));
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Fixed table of the named entities that actually show up in description
/// tags. `&amp;` is decoded last so an escaped entity cannot cascade into a
/// second decode.
fn decode_named_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}")
        .replace("&hellip;", "\u{2026}")
        .replace("&lsquo;", "\u{2018}")
        .replace("&rsquo;", "\u{2019}")
        .replace("&ldquo;", "\u{201c}")
        .replace("&rdquo;", "\u{201d}")
        .replace("&middot;", "\u{00b7}")
        .replace("&copy;", "\u{00a9}")
        .replace("&reg;", "\u{00ae}")
        .replace("&amp;", "&")
}

fn decode_numeric_entities(text: &str) -> String {
    NUMERIC_ENTITY_RE
        .replace_all(text, |captures: &regex::Captures| {
            let body = &captures[1];
            let code = match body.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => body.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned()
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= MAX_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_PREVIEW_CHARS - 1).collect();
    truncated.push('\u{2026}');
    truncated
}
