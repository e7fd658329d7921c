//! CSV persistence for the embedding store.
//!
//! File format: embeddings.csv, one column per embedded section.
//!
//! - record 0: `model`, <model id>, `updated`, <RFC 3339 timestamp>
//! - record 1: `document`, d1, d2, ...
//! - record 2: `section`, s1, s2, ...
//! - record 3+i: i, v1[i], v2[i], ...
//!
//! Columns are written grouped by document. An empty section id is an empty
//! field.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::notes::SectionKey;
use crate::semantic::index::{EmbeddingStore, IndexError};
use crate::storage::write_atomic_with;

const MODEL_LABEL: &str = "model";
const UPDATED_LABEL: &str = "updated";
const DOCUMENT_LABEL: &str = "document";
const SECTION_LABEL: &str = "section";

/// Errors that can occur while reading or writing the store file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Embedding store not found at {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed embedding store: {0}")]
    Malformed(String),
}

impl StoreError {
    fn malformed(message: impl Into<String>) -> Self {
        StoreError::Malformed(message.into())
    }
}

/// Reads and writes one store file.
pub struct StoreFile {
    path: PathBuf,
}

impl StoreFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store, failing with [`StoreError::NotFound`] if absent.
    pub fn load(&self) -> Result<EmbeddingStore, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut records = reader.records();
        let mut next_record = |what: &str| -> Result<csv::StringRecord, StoreError> {
            records
                .next()
                .ok_or_else(|| StoreError::malformed(format!("missing {what} record")))?
                .map_err(StoreError::from)
        };

        let meta = next_record(MODEL_LABEL)?;
        if meta.get(0) != Some(MODEL_LABEL) {
            return Err(StoreError::malformed("first record must start with `model`"));
        }
        let model = meta
            .get(1)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| StoreError::malformed("model id is empty"))?
            .to_string();
        let updated_at = match (meta.get(2), meta.get(3)) {
            (Some(UPDATED_LABEL), Some(ts)) => Some(
                DateTime::parse_from_rfc3339(ts)
                    .map_err(|e| StoreError::malformed(format!("bad timestamp {ts:?}: {e}")))?
                    .with_timezone(&Utc),
            ),
            _ => None,
        };

        let documents = labelled(next_record(DOCUMENT_LABEL)?, DOCUMENT_LABEL)?;
        let sections = labelled(next_record(SECTION_LABEL)?, SECTION_LABEL)?;
        if documents.len() != sections.len() {
            return Err(StoreError::malformed(format!(
                "{} documents but {} sections",
                documents.len(),
                sections.len()
            )));
        }

        let mut columns: Vec<Vec<f32>> = vec![Vec::new(); documents.len()];
        for (row, record) in records.enumerate() {
            let record = record?;
            if record.len() != documents.len() + 1 {
                return Err(StoreError::malformed(format!(
                    "component row {row} has {} values, expected {}",
                    record.len().saturating_sub(1),
                    documents.len()
                )));
            }
            for (column, field) in columns.iter_mut().zip(record.iter().skip(1)) {
                let value: f32 = field.trim().parse().map_err(|_| {
                    StoreError::malformed(format!("component row {row}: not a number: {field:?}"))
                })?;
                column.push(value);
            }
        }

        let mut store = EmbeddingStore::with_capacity(model, documents.len());
        for ((document, section), vector) in documents.into_iter().zip(sections).zip(columns) {
            let key = SectionKey::new(document, section);
            match store.insert(key.clone(), vector) {
                Ok(()) => {}
                Err(IndexError::ZeroNormVector) => {
                    log::warn!("skipping zero-norm vector for {key} in {}", self.path.display());
                }
                Err(e) => return Err(StoreError::malformed(e.to_string())),
            }
        }
        if let Some(at) = updated_at {
            store.set_updated_at(at);
        }

        Ok(store)
    }

    /// Load the store, or an empty one for `model` if the file does not exist.
    pub fn load_or_empty(&self, model: &str) -> Result<EmbeddingStore, StoreError> {
        match self.load() {
            Ok(store) => Ok(store),
            Err(StoreError::NotFound(_)) => Ok(EmbeddingStore::new(model)),
            Err(e) => Err(e),
        }
    }

    /// Save the store atomically: temp file -> fsync -> rename.
    pub fn save(&self, store: &EmbeddingStore) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let updated = store.updated_at().unwrap_or_else(Utc::now).to_rfc3339();
        let grouped = store.documents();
        let keys: Vec<SectionKey> = grouped
            .iter()
            .flat_map(|(doc, sections)| sections.iter().map(move |s| SectionKey::new(*doc, *s)))
            .collect();
        let dims = store.dimensions().unwrap_or(0);

        write_atomic_with(&self.path, |file| -> Result<(), StoreError> {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_writer(file);

            writer.write_record([MODEL_LABEL, store.model(), UPDATED_LABEL, updated.as_str()])?;
            writer.write_record(
                std::iter::once(DOCUMENT_LABEL).chain(keys.iter().map(|k| k.document.as_str())),
            )?;
            writer.write_record(
                std::iter::once(SECTION_LABEL).chain(keys.iter().map(|k| k.section.as_str())),
            )?;

            let vectors: Vec<&[f32]> = keys.iter().filter_map(|k| store.get(k)).collect();
            for i in 0..dims {
                let mut row = Vec::with_capacity(vectors.len() + 1);
                row.push(i.to_string());
                row.extend(vectors.iter().map(|v| v[i].to_string()));
                writer.write_record(&row)?;
            }

            writer.flush()?;
            Ok(())
        })?;

        log::debug!(
            "saved {} embeddings ({} dims) to {}",
            keys.len(),
            dims,
            self.path.display()
        );

        Ok(())
    }
}

/// Fields after the expected leading label.
fn labelled(record: csv::StringRecord, label: &str) -> Result<Vec<String>, StoreError> {
    if record.get(0) != Some(label) {
        return Err(StoreError::malformed(format!(
            "expected `{label}` record, found {:?}",
            record.get(0).unwrap_or("")
        )));
    }
    Ok(record.iter().skip(1).map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample_store() -> EmbeddingStore {
        let mut store = EmbeddingStore::new("text-embedding-ada-002");
        store
            .insert(SectionKey::new("Atoms/One.md", ""), vec![0.25, -1.5, 3.0])
            .unwrap();
        store
            .insert(SectionKey::new("Atoms/One.md", "Intro, part 1"), vec![1.0, 0.0, 0.1])
            .unwrap();
        store
            .insert(SectionKey::new("Two.md", ""), vec![0.5, 2.0, -0.5])
            .unwrap();
        store.set_updated_at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        store
    }

    #[test]
    fn test_save_and_load() {
        let tmp = tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("embeddings.csv"));
        let store = sample_store();

        file.save(&store).unwrap();
        let loaded = file.load().unwrap();

        assert_eq!(loaded.model(), "text-embedding-ada-002");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimensions(), Some(3));
        assert_eq!(loaded.updated_at(), store.updated_at());
        for (key, vector) in store.iter() {
            assert_eq!(loaded.get(key), Some(vector), "vector for {key}");
        }
    }

    #[test]
    fn test_layout() {
        let tmp = tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("embeddings.csv"));
        file.save(&sample_store()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3 + 3);
        assert!(lines[0].starts_with("model,text-embedding-ada-002,updated,2024-03-01T12:00:00"));
        assert_eq!(lines[1], "document,Atoms/One.md,Atoms/One.md,Two.md");
        assert_eq!(lines[2], "section,,\"Intro, part 1\",");
        assert_eq!(lines[3], "0,0.25,1,0.5");
    }

    #[test]
    fn test_columns_grouped_by_document() {
        let tmp = tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("embeddings.csv"));

        let mut store = EmbeddingStore::new("model");
        store.insert(SectionKey::new("a.md", ""), vec![1.0]).unwrap();
        store.insert(SectionKey::new("b.md", ""), vec![2.0]).unwrap();
        store.insert(SectionKey::new("a.md", "Later"), vec![3.0]).unwrap();
        file.save(&store).unwrap();

        let loaded = file.load().unwrap();
        let keys: Vec<String> = loaded.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["a.md", "a.md Later", "b.md"]);
    }

    #[test]
    fn test_empty_section_round_trips() {
        let tmp = tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("embeddings.csv"));
        file.save(&sample_store()).unwrap();

        let loaded = file.load().unwrap();
        assert!(loaded.contains(&SectionKey::new("Two.md", "")));
    }

    #[test]
    fn test_empty_store_round_trips() {
        let tmp = tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("embeddings.csv"));
        file.save(&EmbeddingStore::new("model")).unwrap();

        let loaded = file.load().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.model(), "model");
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempdir().unwrap();
        let file = StoreFile::new(tmp.path().join("embeddings.csv"));

        assert!(matches!(file.load(), Err(StoreError::NotFound(_))));
        let empty = file.load_or_empty("model").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("embeddings.csv");
        let file = StoreFile::new(path.clone());

        std::fs::write(&path, "garbage\n").unwrap();
        assert!(matches!(file.load(), Err(StoreError::Malformed(_))));

        std::fs::write(&path, "model,m,updated,2024-03-01T12:00:00+00:00\ndocument,a.md\nsection,\n0,abc\n")
            .unwrap();
        assert!(matches!(file.load(), Err(StoreError::Malformed(_))));

        std::fs::write(&path, "model,m,updated,2024-03-01T12:00:00+00:00\ndocument,a.md,b.md\nsection,\n")
            .unwrap();
        assert!(matches!(file.load(), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_zero_norm_column_skipped_on_load() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("embeddings.csv");
        std::fs::write(
            &path,
            "model,m,updated,2024-03-01T12:00:00+00:00\ndocument,a.md,b.md\nsection,,\n0,0,1\n1,0,0\n",
        )
        .unwrap();

        let loaded = StoreFile::new(path).load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains(&SectionKey::new("b.md", "")));
    }
}
