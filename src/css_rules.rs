//! Recovery of top-level rule blocks from raw style sheet text
//!
//! This is a pattern scanner, not a CSS parser: it only finds where
//! `@import` statements, `@keyframes` blocks, `@media` wrappers and plain
//! selector blocks begin and end. Input with unbalanced braces or deeper
//! nesting than `@media { selector { } }` is not guaranteed to be recovered.

use regex::Regex;
use std::sync::LazyLock;

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*[\s\S]*?\*/").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Keyframes header followed by brace-balanced percentage/from/to blocks.
static KEYFRAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)@(?:-[a-z]+-)?keyframes\s+[^{]*\{(?:\s*[^{}]*\{[^{}]*\})*\s*\}")
        .expect("valid regex")
});

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*@import\s*[^;{}]*?(?:url\([^)]*\)|"[^"]*"|'[^']*')[^;{}]*;"#)
        .expect("valid regex")
});

/// Statement at-rules such as `@charset` or `@namespace`.
static AT_STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*@[a-z-]+[^;{}]*;").expect("valid regex"));

/// Either a `@media` wrapper around selector blocks or a single selector block.
static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\s*@media[^{]*\{(?:[^{}]*\{[^{}]*\})*\s*\}|[^{}]*\{[^{}]*\})")
        .expect("valid regex")
});

/// Recover the ordered list of top-level rule blocks in `css_text`.
///
/// Keyframes are lifted out first so the general block scanner never sees
/// their nested braces; every block is then placed back at its source
/// position, so the result follows source order across all block kinds.
pub fn extract_rules(css_text: &str) -> Vec<String> {
    let normalized = normalize(css_text);

    let mut blocks: Vec<(usize, String)> = Vec::new();
    let mut removed: Vec<(usize, usize)> = Vec::new();
    let mut working = String::with_capacity(normalized.len());
    let mut last = 0;

    for keyframes in KEYFRAMES.find_iter(&normalized) {
        blocks.push((keyframes.start(), keyframes.as_str().trim().to_string()));
        working.push_str(&normalized[last..keyframes.start()]);
        removed.push((keyframes.start(), keyframes.len()));
        last = keyframes.end();
    }
    working.push_str(&normalized[last..]);

    let mut cursor = 0;
    while cursor < working.len() {
        let rest = &working[cursor..];
        let Some(found) = IMPORT
            .find(rest)
            .or_else(|| AT_STATEMENT.find(rest))
            .or_else(|| BLOCK.find(rest))
        else {
            break;
        };
        if found.end() == 0 {
            break;
        }

        let text = found.as_str();
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let leading = text.len() - text.trim_start().len();
            let offset = source_offset(cursor + leading, &removed);
            blocks.push((offset, trimmed.to_string()));
        }
        cursor += found.end();
    }

    blocks.sort_by_key(|(offset, _)| *offset);
    blocks.into_iter().map(|(_, block)| block).collect()
}

/// Strip comments and collapse line breaks, tabs and whitespace runs.
fn normalize(css_text: &str) -> String {
    let without_comments = COMMENTS.replace_all(css_text, "");
    WHITESPACE
        .replace_all(&without_comments, " ")
        .trim()
        .to_string()
}

/// Map an offset in the keyframes-free text back to the normalized text.
fn source_offset(working_offset: usize, removed: &[(usize, usize)]) -> usize {
    let mut offset = working_offset;
    for &(start, len) in removed {
        if start > offset {
            break;
        }
        offset += len;
    }
    offset
}
