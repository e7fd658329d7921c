//! In-memory embedding store.
//!
//! Holds one vector per section key, in insertion order, all produced by
//! the same model and sharing one dimensionality.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::notes::SectionKey;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,

    #[error("Cannot store an empty vector")]
    EmptyVector,

    #[error("Key already embedded: {0}")]
    DuplicateKey(SectionKey),

    #[error("Model mismatch: store uses {expected}, got {got}")]
    ModelMismatch { expected: String, got: String },
}

/// Vectors keyed by `(document, section)`.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    model: String,
    dimensions: Option<usize>,
    keys: Vec<SectionKey>,
    vectors: Vec<Vec<f32>>,
    positions: HashMap<SectionKey, usize>,
    updated_at: Option<DateTime<Utc>>,
}

impl EmbeddingStore {
    /// Create an empty store for vectors produced by `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dimensions: None,
            keys: Vec::new(),
            vectors: Vec::new(),
            positions: HashMap::new(),
            updated_at: None,
        }
    }

    /// Create a store with pre-allocated capacity.
    pub fn with_capacity(model: impl Into<String>, capacity: usize) -> Self {
        let mut store = Self::new(model);
        store.keys.reserve(capacity);
        store.vectors.reserve(capacity);
        store.positions.reserve(capacity);
        store
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Dimensionality shared by every vector, `None` while empty.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &SectionKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn get(&self, key: &SectionKey) -> Option<&[f32]> {
        self.positions
            .get(key)
            .map(|&idx| self.vectors[idx].as_slice())
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }

    /// Add a new key.
    ///
    /// Existing keys are never replaced; empty, zero-norm and wrongly sized
    /// vectors are rejected.
    pub fn insert(&mut self, key: SectionKey, embedding: Vec<f32>) -> Result<(), IndexError> {
        if self.positions.contains_key(&key) {
            return Err(IndexError::DuplicateKey(key));
        }

        if embedding.is_empty() {
            return Err(IndexError::EmptyVector);
        }

        if let Some(expected) = self.dimensions {
            if embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
        }

        if l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.dimensions = Some(embedding.len());
        self.positions.insert(key.clone(), self.keys.len());
        self.keys.push(key);
        self.vectors.push(embedding);

        Ok(())
    }

    /// Union `other` into this store without touching existing keys.
    ///
    /// Returns the number of keys added.
    pub fn merge(&mut self, other: EmbeddingStore) -> Result<usize, IndexError> {
        if other.is_empty() {
            return Ok(0);
        }

        if other.model != self.model {
            return Err(IndexError::ModelMismatch {
                expected: self.model.clone(),
                got: other.model,
            });
        }

        if let (Some(expected), Some(got)) = (self.dimensions, other.dimensions) {
            if expected != got {
                return Err(IndexError::DimensionMismatch { expected, got });
            }
        }

        let mut added = 0;
        for (key, embedding) in other.keys.into_iter().zip(other.vectors) {
            if self.positions.contains_key(&key) {
                continue;
            }
            self.insert(key, embedding)?;
            added += 1;
        }

        Ok(added)
    }

    /// Iterate over entries in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&SectionKey, &[f32])> {
        self.keys
            .iter()
            .zip(self.vectors.iter().map(|v| v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &SectionKey> {
        self.keys.iter()
    }

    /// Section ids grouped under their document, documents in first-seen order.
    pub fn documents(&self) -> Vec<(&str, Vec<&str>)> {
        let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();

        for key in &self.keys {
            let slot = *slots.entry(key.document.as_str()).or_insert_with(|| {
                grouped.push((key.document.as_str(), Vec::new()));
                grouped.len() - 1
            });
            grouped[slot].1.push(key.section.as_str());
        }

        grouped
    }
}

/// Compute L2 norm of a vector.
pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
