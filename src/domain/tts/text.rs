use html2text::from_read;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

const MAX_SLUG_CHARS: usize = 60;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("tag pattern is valid"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("url pattern is valid"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Clean article text before chunking: strip HTML (only when tags are
/// present), drop bare URLs and collapse whitespace inside paragraphs.
/// Blank-line paragraph breaks are kept for the chunker.
pub fn prepare_text(raw: &str) -> String {
    let plain_text = if HTML_TAG.is_match(raw) {
        from_read(raw.as_bytes(), usize::MAX)
    } else {
        raw.to_string()
    };

    let without_urls = URL.replace_all(&plain_text, "");

    PARAGRAPH_BREAK
        .split(&without_urls)
        .map(|paragraph| WHITESPACE.replace_all(paragraph, " ").trim().to_string())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic cache key for an item: a readable slug of the title plus a
/// short digest of the disambiguator (the source identifier when known).
pub fn item_slug(title: &str, disambiguator: Option<&str>) -> String {
    let mut slug = String::with_capacity(MAX_SLUG_CHARS);
    let mut pending_dash = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
            if slug.len() >= MAX_SLUG_CHARS {
                break;
            }
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("item");
    }

    let source = disambiguator.unwrap_or(title);
    let digest = Sha256::digest(source.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();

    format!("{}-{}", slug, suffix)
}
