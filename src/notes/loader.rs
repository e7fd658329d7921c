use std::io::ErrorKind;
use std::path::{Component, Path};

use walkdir::{DirEntry, WalkDir};

use super::clean::clean_section;
use super::tag::TagClass;
use super::{NoteError, Section, SectionKey};

/// Extension of note files
const NOTE_EXTENSION: &str = "md";

/// Heading marker that opens a named section (depth >= 2)
const SECTION_HEADING: &str = "##";

/// Walks a vault and turns every indexable note into cleaned sections.
pub struct NoteLoader {
    skip_dirs: Vec<String>,
}

impl NoteLoader {
    pub fn new(skip_dirs: Vec<String>) -> Self {
        Self { skip_dirs }
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| self.skip_dirs.iter().any(|skip| skip == name))
                .unwrap_or(false)
    }

    /// Load every section of every indexable note under `root`.
    ///
    /// Files are visited in file-name order and sections keep their order
    /// inside a note, so an unchanged tree always yields the same sequence.
    pub fn load(&self, root: &Path) -> Result<Vec<Section>, NoteError> {
        let mut sections = Vec::new();
        let mut notes = 0usize;

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_skipped(entry));

        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().map(|e| e != NOTE_EXTENSION).unwrap_or(true)
            {
                continue;
            }

            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) if err.kind() == ErrorKind::InvalidData => {
                    log::warn!("skipping {}: not valid UTF-8", path.display());
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let document = document_id(root, path);
            let note_sections = parse_note(&document, &text);
            if !note_sections.is_empty() {
                notes += 1;
            }
            sections.extend(note_sections);
        }

        log::debug!(
            "loaded {} sections from {} notes under {}",
            sections.len(),
            notes,
            root.display()
        );

        Ok(sections)
    }
}

/// Stable `/`-separated identifier of a note relative to the vault root.
pub fn document_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Classify, segment and clean a single note.
///
/// Returns nothing for topic/author index pages. CRLF line endings are
/// read as LF.
pub fn parse_note(document: &str, text: &str) -> Vec<Section> {
    let text = text.replace("\r\n", "\n");
    let class = TagClass::detect(&text);
    if !class.is_indexed() {
        log::debug!("skipping index page {document}");
        return Vec::new();
    }

    let split = class.divider_split();
    extract_sections(&text)
        .into_iter()
        .filter_map(|(name, raw)| {
            let cleaned = clean_section(&raw, split);
            if cleaned.is_empty() {
                None
            } else {
                Some(Section {
                    key: SectionKey::new(document, name),
                    text: cleaned,
                })
            }
        })
        .collect()
}

/// Split a note into `(heading, raw body)` pairs.
///
/// Text before the first heading belongs to the `""` section. A heading only
/// opens a new section once the current one has collected some text; a
/// heading met while the current section is still empty is dropped.
pub fn extract_sections(text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = vec![(String::new(), String::new())];
    let mut current = 0usize;

    for line in text.split('\n') {
        if line.starts_with(SECTION_HEADING) {
            if !sections[current].1.is_empty() {
                let name = line.trim_start_matches('#').trim().to_string();
                current = match sections.iter().position(|(n, _)| *n == name) {
                    Some(existing) => {
                        sections[existing].1.clear();
                        existing
                    }
                    None => {
                        sections.push((name, String::new()));
                        sections.len() - 1
                    }
                };
            }
        } else {
            let body = &mut sections[current].1;
            body.push_str(line);
            body.push('\n');
        }
    }

    sections
}
