//! Persisted query embeddings.
//!
//! Maps the exact query string to its vector. No normalization, no eviction.
//! The file is rewritten after every miss.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use crate::semantic::embeddings::{EmbeddingClient, EmbeddingError};
use crate::storage::write_atomic;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed query cache {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

pub struct QueryCache {
    path: PathBuf,
    entries: BTreeMap<String, Vec<f32>>,
}

impl QueryCache {
    /// Load the cache from `path`; a missing file is an empty cache.
    pub fn load(path: PathBuf) -> Result<Self, CacheError> {
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| CacheError::Malformed {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, query: &str) -> Option<&[f32]> {
        self.entries.get(query).map(|v| v.as_slice())
    }

    /// Return the cached vector for `query`, embedding and persisting it on a miss.
    pub fn get_or_compute(
        &mut self,
        query: &str,
        client: &EmbeddingClient,
    ) -> Result<Vec<f32>, CacheError> {
        if let Some(vector) = self.entries.get(query) {
            log::debug!("query cache hit for {query:?}");
            return Ok(vector.clone());
        }

        log::debug!("query cache miss for {query:?}");
        let vector = client.embed(query)?;
        self.entries.insert(query.to_string(), vector.clone());
        self.save()?;

        Ok(vector)
    }

    fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&self.entries).map_err(io::Error::other)?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use crate::semantic::embeddings::{EmbeddingProvider, RetryPolicy};

    struct CountingProvider {
        calls: Rc<Cell<u32>>,
    }

    impl EmbeddingProvider for CountingProvider {
        fn model(&self) -> &str {
            "counting"
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn client() -> (EmbeddingClient, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let provider = CountingProvider {
            calls: calls.clone(),
        };
        (
            EmbeddingClient::new(Box::new(provider), RetryPolicy::none(), Duration::ZERO),
            calls,
        )
    }

    #[test]
    fn test_one_provider_call_per_distinct_query() {
        let tmp = tempfile::tempdir().unwrap();
        let (client, calls) = client();
        let mut cache = QueryCache::load(tmp.path().join("query_cache.json")).unwrap();

        let first = cache.get_or_compute("linear regression", &client).unwrap();
        let second = cache.get_or_compute("linear regression", &client).unwrap();
        cache.get_or_compute("Linear regression", &client).unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_persisted_across_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("query_cache.json");
        let (client, calls) = client();

        let mut cache = QueryCache::load(path.clone()).unwrap();
        cache.get_or_compute("entropy", &client).unwrap();

        let mut reloaded = QueryCache::load(path).unwrap();
        assert_eq!(reloaded.get("entropy"), Some(&[7.0, 1.0][..]));
        reloaded.get_or_compute("entropy", &client).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::load(tmp.path().join("query_cache.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("query_cache.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            QueryCache::load(path),
            Err(CacheError::Malformed { .. })
        ));
    }
}
