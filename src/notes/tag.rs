//! Note tag classes.
//!
//! Every note carries at most one meaningful class marker (`#atom`,
//! `#molecule`, `#source`, `#topic`, `#author`) somewhere in its text. The
//! class decides how frontmatter is split from content and whether the note
//! is indexed at all.

const TOPIC_MARKER: &str = "#topic";
const AUTHOR_MARKER: &str = "#author";
const ATOM_MARKER: &str = "#atom";
const MOLECULE_MARKER: &str = "#molecule";
const SOURCE_MARKER: &str = "#source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    Atom,
    Molecule,
    Source,
    Topic,
    Author,
    Plain,
}

/// How a section body is cut around its first divider line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DividerSplit {
    /// Keep what precedes the divider (trailing metadata block dropped).
    KeepBefore,
    /// Keep what follows the divider (leading frontmatter dropped).
    KeepAfter,
    /// No split.
    None,
}

impl TagClass {
    /// Classify a note from its full text.
    ///
    /// Marker matching is a plain substring test. Index pages win over
    /// content classes, atom/molecule win over source.
    pub fn detect(text: &str) -> Self {
        if text.contains(TOPIC_MARKER) {
            TagClass::Topic
        } else if text.contains(AUTHOR_MARKER) {
            TagClass::Author
        } else if text.contains(ATOM_MARKER) {
            TagClass::Atom
        } else if text.contains(MOLECULE_MARKER) {
            TagClass::Molecule
        } else if text.contains(SOURCE_MARKER) {
            TagClass::Source
        } else {
            TagClass::Plain
        }
    }

    /// Topic and author notes are index pages and never embedded.
    pub fn is_indexed(self) -> bool {
        !matches!(self, TagClass::Topic | TagClass::Author)
    }

    pub fn divider_split(self) -> DividerSplit {
        match self {
            TagClass::Atom | TagClass::Molecule => DividerSplit::KeepBefore,
            TagClass::Source => DividerSplit::KeepAfter,
            TagClass::Topic | TagClass::Author | TagClass::Plain => DividerSplit::None,
        }
    }
}
