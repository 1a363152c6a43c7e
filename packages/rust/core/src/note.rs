//! Attribution Note content.
//!
//! ```text
//! author: Bill Toulas; Jane Roe
//! publisher: BleepingComputer
//! raw_text_ref:
//! - article_url: https://ex.com/b
//! - raw_saved_path: raw/ex-com-b.txt
//! - raw_sha256: 9f86…
//! - raw_char_len: 1834
//! - raw_truncated: false
//! ```
//!
//! The enrichment pass reads the `- raw_saved_path:` and `- raw_sha256:` lines
//! back and rewrites the first `author:` line, so this layout is a format,
//! not prose.

use stixgraph_shared::CleanedItem;
use stixgraph_stix::text::{is_sha256_hex, truncate_chars};

pub const NOTE_MAX_CHARS: usize = 20_000;

const AUTHOR_PREFIX: &str = "author:";
const RAW_PATH_PREFIX: &str = "- raw_saved_path:";
const RAW_SHA_PREFIX: &str = "- raw_sha256:";

/// Where the unprocessed article text lives, without embedding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTextRef {
    pub article_url: String,
    pub raw_saved_path: String,
    pub raw_sha256: String,
    pub raw_char_len: u64,
    pub raw_truncated: bool,
}

impl RawTextRef {
    /// The raw reference recorded by the cleaning stage, if it captured one.
    pub fn from_cleaned(article_url: &str, cleaned: &CleanedItem) -> Option<Self> {
        if cleaned.raw_saved_path.is_empty() && !is_sha256_hex(&cleaned.raw_sha256) {
            return None;
        }
        Some(Self {
            article_url: article_url.to_string(),
            raw_saved_path: cleaned.raw_saved_path.clone(),
            raw_sha256: cleaned.raw_sha256.clone(),
            raw_char_len: cleaned.raw_char_len,
            raw_truncated: cleaned.raw_truncated,
        })
    }
}

/// `author: A; B`, or `author: Unknown` for an empty list.
pub fn author_line(authors: &[String]) -> String {
    if authors.is_empty() {
        format!("{AUTHOR_PREFIX} Unknown")
    } else {
        format!("{AUTHOR_PREFIX} {}", authors.join("; "))
    }
}

/// Full Note content for one Report.
pub fn attribution_content(authors: &[String], publisher: &str, raw: Option<&RawTextRef>) -> String {
    let mut lines = vec![author_line(authors), format!("publisher: {publisher}")];
    match raw {
        Some(raw) => {
            lines.push("raw_text_ref:".into());
            lines.push(format!("- article_url: {}", raw.article_url));
            lines.push(format!("{RAW_PATH_PREFIX} {}", raw.raw_saved_path));
            lines.push(format!("{RAW_SHA_PREFIX} {}", raw.raw_sha256));
            lines.push(format!("- raw_char_len: {}", raw.raw_char_len));
            lines.push(format!("- raw_truncated: {}", raw.raw_truncated));
        }
        None => lines.push("raw_text_ref: (not available)".into()),
    }
    truncate_chars(&lines.join("\n"), NOTE_MAX_CHARS)
}

/// Whether `content` is an attribution Note (first line `author:`, any case).
pub fn is_attribution(content: &str) -> bool {
    content
        .get(..AUTHOR_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(AUTHOR_PREFIX))
}

/// The recorded raw text path, if any.
pub fn raw_saved_path(content: &str) -> Option<&str> {
    line_value(content, RAW_PATH_PREFIX)
}

/// The recorded raw text SHA-256, if any.
pub fn raw_sha256(content: &str) -> Option<&str> {
    line_value(content, RAW_SHA_PREFIX)
}

fn line_value<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Replace the first `author:` line (or prepend one), capped to [`NOTE_MAX_CHARS`].
pub fn set_author_line(content: &str, authors: &[String]) -> String {
    let line = author_line(authors);
    if content.is_empty() {
        return line;
    }

    let updated = if is_attribution(content) {
        let rest = content.split_once('\n').map(|(_, rest)| rest);
        match rest {
            Some(rest) => format!("{line}\n{rest}"),
            None => line,
        }
    } else {
        format!("{line}\n{content}")
    };
    truncate_chars(&updated, NOTE_MAX_CHARS)
}
