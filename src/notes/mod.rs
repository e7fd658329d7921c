//! Note collection for the semantic index.
//!
//! # Architecture
//!
//! - `tag`: Tag classes (atom, molecule, source, ...) and their split rules
//! - `clean`: Markdown-to-plain-text cleaning of a section
//! - `loader`: Vault walking and heading segmentation

mod clean;
mod loader;
mod tag;

use std::fmt;

use serde::Serialize;

pub use loader::NoteLoader;

/// Errors raised while walking the vault.
#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("failed to walk vault: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read note: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of an embedded block: a note and one of its sections.
///
/// `section` is the heading text, or `""` for the text before the first
/// heading. The empty section is a real key like any other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SectionKey {
    pub document: String,
    pub section: String,
}

impl SectionKey {
    pub fn new(document: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            section: section.into(),
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.section.is_empty() {
            write!(f, "{}", self.document)
        } else {
            write!(f, "{} {}", self.document, self.section)
        }
    }
}

/// A cleaned section ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub key: SectionKey,
    pub text: String,
}

impl Section {
    /// Text sent to the embedding provider: heading, then body.
    pub fn block(&self) -> String {
        format!("{}. {}", self.key.section, self.text)
    }
}
