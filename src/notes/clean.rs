//! Section text cleaning.
//!
//! Turns a raw Markdown section into the plain text that gets embedded:
//! 1. Cut around the first divider line according to the note's tag class
//!    and drop the class markers themselves
//! 2. Replace `[text](url)` links with their text
//! 3. Strip wikilink brackets and emphasis markers
//! 4. Collapse whitespace to single spaces
//! 5. Un-escape doubled backslashes and trim

use once_cell::sync::Lazy;
use regex::Regex;

use super::tag::DividerSplit;

static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(.*?)\]\((.*?)\)").expect("valid link regex"));

static CLASS_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(?:atom|molecule|source)\b").expect("valid marker regex"));

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("valid space regex"));

/// Markers removed outright
const STRIPPED: [&str; 3] = ["[[", "]]", "*"];

/// Characters replaced with a plain space
const SPACE_LIKE: [char; 4] = ['\n', '\r', '\t', '\u{a0}'];

/// A divider is a line made of three or more dashes.
pub fn is_divider(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-')
}

/// Cut `text` around its first divider line. Text without a divider is returned whole.
pub fn split_at_divider(text: &str, split: DividerSplit) -> String {
    if split == DividerSplit::None {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let Some(divider) = lines.iter().position(|line| is_divider(line)) else {
        return text.to_string();
    };

    match split {
        DividerSplit::KeepBefore => lines[..divider].join("\n"),
        DividerSplit::KeepAfter => lines[divider + 1..].join("\n"),
        DividerSplit::None => text.to_string(),
    }
}

/// Clean a raw section body for embedding.
pub fn clean_section(text: &str, split: DividerSplit) -> String {
    let text = split_at_divider(text, split);
    let text = CLASS_MARKER_RE.replace_all(&text, "");
    let mut text = MARKDOWN_LINK_RE.replace_all(&text, "$1").into_owned();

    for marker in STRIPPED {
        text = text.replace(marker, "");
    }

    let text = text.replace(&SPACE_LIKE[..], " ");
    let text = MULTI_SPACE_RE.replace_all(&text, " ");
    let text = text.replace("\\\\", "\\");

    text.trim().to_string()
}
