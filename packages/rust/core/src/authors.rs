//! Author name parsing.
//!
//! Three small, pure pieces:
//! - [`normalize_author_key`]: the dedup key for an author name
//! - [`split_author_names`]: one delimiter-joined string into names
//! - [`extract_byline_authors`]: a best-effort `By …` search over raw article text

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use stixgraph_shared::AuthorField;
use stixgraph_stix::text::truncate_chars;

/// Raw-text window searched for a byline.
const BYLINE_MAX_CHARS: usize = 5000;
const BYLINE_MAX_LINES: usize = 30;

/// Dedup key: lower-cased, punctuation stripped, whitespace collapsed.
///
/// `"Bill Toulas"`, `"bill toulas."` and `"Bill  Toulas"` share one key.
pub fn normalize_author_key(name: &str) -> String {
    static PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"[.,;:()"'`’“”\-_/\\]+"#).expect("valid regex")
    });

    let lowered = name.to_lowercase();
    let stripped = PUNCT_RE.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a delimiter-joined author string into names.
///
/// Delimiters are `,` `;` `|` `&` and the word `and` (any case). A leading
/// `by ` is dropped from each name. Duplicates are removed case-sensitively,
/// keeping the first occurrence.
pub fn split_author_names(text: &str) -> Vec<String> {
    static AND_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("valid regex"));

    let unified = AND_RE.replace_all(text, ",");
    dedup_names(unified.split([',', ';', '|', '&']).map(strip_by_prefix))
}

/// Turn an upstream author field into an ordered, deduplicated list of names.
///
/// A list is taken as already structured and is not split further.
pub fn parse_author_field(field: Option<&AuthorField>) -> Vec<String> {
    match field {
        None => Vec::new(),
        Some(AuthorField::Text(text)) => split_author_names(text),
        Some(AuthorField::List(items)) => dedup_names(items.iter().map(|s| s.trim())),
    }
}

/// Find author names in a `By …` line near the top of raw article text.
///
/// Returns an empty list when nothing looks like a byline.
pub fn extract_byline_authors(raw_text: &str) -> Vec<String> {
    static LINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^\s*By\s+(.+?)\s*$").expect("valid regex"));
    static INLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\bBy\s+([A-Z][^\n\r<]{2,80})").expect("valid regex"));

    let head = truncate_chars(raw_text, BYLINE_MAX_CHARS);

    for line in head.lines().take(BYLINE_MAX_LINES) {
        if let Some(caps) = LINE_RE.captures(line) {
            let authors = split_byline(&caps[1]);
            if !authors.is_empty() {
                return authors;
            }
        }
    }

    INLINE_RE
        .captures(&head)
        .map(|caps| split_byline(&caps[1]))
        .unwrap_or_default()
}

/// Bylines often carry a ` | Section` tail after the names.
fn split_byline(byline: &str) -> Vec<String> {
    static SECTION_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+\|\s+").expect("valid regex"));
    let names = SECTION_RE.split(byline).next().unwrap_or_default();
    split_author_names(names.trim())
}

fn strip_by_prefix(part: &str) -> &str {
    let part = part.trim();
    match part.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("by ") => part[3..].trim(),
        _ => part,
    }
}

fn dedup_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect()
}
