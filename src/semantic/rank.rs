//! Cosine similarity ranking over the whole store.

use serde::Serialize;

use crate::notes::SectionKey;
use crate::semantic::index::{l2_norm, EmbeddingStore, IndexError};

/// A stored section scored against a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSection {
    pub key: SectionKey,
    pub similarity: f32,
}

/// Score every stored vector against `query`, best first.
///
/// The sort is stable, so equal scores keep store order. Stored vectors with
/// zero norm or the wrong dimension are skipped. The result is unbounded.
pub fn rank(query: &[f32], store: &EmbeddingStore) -> Result<Vec<RankedSection>, IndexError> {
    if let Some(expected) = store.dimensions() {
        if query.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                got: query.len(),
            });
        }
    }

    let query_norm = l2_norm(query);
    if query_norm < f32::EPSILON {
        return Err(IndexError::ZeroNormVector);
    }

    let mut results: Vec<RankedSection> = store
        .iter()
        .filter_map(|(key, vector)| {
            if vector.len() != query.len() {
                return None;
            }
            let norm = l2_norm(vector);
            if norm < f32::EPSILON {
                return None;
            }
            let similarity = dot(query, vector) / (query_norm * norm);
            if similarity.is_nan() {
                return None;
            }
            Some(RankedSection {
                key: key.clone(),
                similarity,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(results)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(entries: &[(&str, &str, Vec<f32>)]) -> EmbeddingStore {
        let mut store = EmbeddingStore::new("model");
        for (doc, section, vector) in entries {
            store
                .insert(SectionKey::new(*doc, *section), vector.clone())
                .unwrap();
        }
        store
    }

    #[test]
    fn test_identical_vector_ranks_first() {
        let store = store(&[
            ("a.md", "", vec![0.0, 1.0, 0.0]),
            ("b.md", "", vec![1.0, 2.0, 3.0]),
            ("c.md", "", vec![1.0, 1.0, 0.0]),
        ]);

        let ranked = rank(&[1.0, 2.0, 3.0], &store).unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].key, SectionKey::new("b.md", ""));
        assert!((ranked[0].similarity - 1.0).abs() < 1e-6);
        assert!(ranked
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_ties_keep_store_order() {
        let store = store(&[
            ("a.md", "", vec![1.0, 0.0]),
            ("b.md", "", vec![2.0, 0.0]),
            ("c.md", "", vec![3.0, 0.0]),
        ]);

        let ranked = rank(&[1.0, 0.0], &store).unwrap();
        let docs: Vec<&str> = ranked.iter().map(|r| r.key.document.as_str()).collect();
        assert_eq!(docs, vec!["a.md", "b.md", "c.md"]);
    }

    #[test]
    fn test_opposite_vector_is_negative() {
        let store = store(&[("a.md", "", vec![-1.0, 0.0])]);
        let ranked = rank(&[1.0, 0.0], &store).unwrap();
        assert!((ranked[0].similarity + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_query_rejected() {
        let store = store(&[("a.md", "", vec![1.0, 0.0])]);
        assert!(matches!(
            rank(&[0.0, 0.0], &store),
            Err(IndexError::ZeroNormVector)
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let store = store(&[("a.md", "", vec![1.0, 0.0])]);
        assert!(matches!(
            rank(&[1.0, 0.0, 0.0], &store),
            Err(IndexError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_empty_store_ranks_nothing() {
        let store = EmbeddingStore::new("model");
        assert!(rank(&[1.0], &store).unwrap().is_empty());
    }
}
