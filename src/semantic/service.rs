//! Index maintenance and query orchestration.
//!
//! Ties the note loader, the cost gate, the embedding client, the store
//! file and the query cache together. Every build, update and query runs
//! under the data directory lock.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Config;
use crate::lock::FileLock;
use crate::notes::{NoteError, NoteLoader, Section, SectionKey};
use crate::semantic::cache::{CacheError, QueryCache};
use crate::semantic::cost::{Confirmer, CostEstimate};
use crate::semantic::embeddings::EmbeddingClient;
use crate::semantic::index::{EmbeddingStore, IndexError};
use crate::semantic::rank::{rank, RankedSection};
use crate::semantic::storage::{StoreError, StoreFile};
use crate::semantic::tokens::TokenCounter;

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("No embedding store at {0}, run `nmr build` first")]
    StoreNotFound(PathBuf),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Query cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Note loading error: {0}")]
    Notes(#[from] NoteError),

    #[error("Failed to lock data directory: {0}")]
    Lock(#[source] io::Error),

    #[error("No section could be embedded ({failed} failed), store left unchanged")]
    NothingEmbedded { failed: usize },

    #[error("Cancelled")]
    Cancelled,
}

/// Outcome of a build or update run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Sections that were candidates for embedding
    pub candidates: usize,
    pub embedded: usize,
    pub failed: Vec<SectionKey>,
    pub truncated: Vec<SectionKey>,
    /// Sections in the store after the run
    pub total: usize,
}

/// Snapshot of the store against the current vault.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub store_path: PathBuf,
    pub store_present: bool,
    pub model: Option<String>,
    pub sections: usize,
    pub documents: usize,
    pub dimensions: Option<usize>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cache_entries: usize,
    /// Sections in the vault with no embedding yet
    pub pending: usize,
    /// Embedded sections no longer present in the vault
    pub orphaned: usize,
    /// Embedded notes modified after the last store update; `update` keeps
    /// their old vectors, `build` refreshes them
    pub stale_documents: Vec<String>,
}

/// Service for building the embedding store and querying it.
pub struct SemanticSearchService {
    config: Config,
    vault: PathBuf,
    client: EmbeddingClient,
    counter: Box<dyn TokenCounter>,
    confirmer: Box<dyn Confirmer>,
    show_progress: bool,
}

impl SemanticSearchService {
    pub fn new(
        config: Config,
        vault: PathBuf,
        client: EmbeddingClient,
        counter: Box<dyn TokenCounter>,
        confirmer: Box<dyn Confirmer>,
    ) -> Self {
        Self {
            config,
            vault,
            client,
            counter,
            confirmer,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while embedding.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn lock(&self) -> Result<FileLock, SemanticSearchError> {
        FileLock::try_acquire(self.config.data_dir()).map_err(SemanticSearchError::Lock)
    }

    fn store_file(&self) -> StoreFile {
        StoreFile::new(self.config.store_path())
    }

    fn load_sections(&self) -> Result<Vec<Section>, SemanticSearchError> {
        let loader = NoteLoader::new(self.config.skip_dirs.clone());
        Ok(loader.load(&self.vault)?)
    }

    /// Re-embed every section of the vault and replace the store.
    ///
    /// If no section could be embedded the existing store file is kept.
    pub fn build(&self) -> Result<BuildReport, SemanticSearchError> {
        let _lock = self.lock()?;
        let _span = tracing::info_span!("build", vault = %self.vault.display()).entered();

        let sections = self.load_sections()?;
        self.confirm(&sections)?;

        let mut store = EmbeddingStore::with_capacity(self.client.model(), sections.len());
        let mut report = self.embed_sections(&sections, None, &mut store);
        if report.embedded == 0 && report.candidates > 0 {
            return Err(SemanticSearchError::NothingEmbedded {
                failed: report.failed.len(),
            });
        }

        store.set_updated_at(Utc::now());
        self.store_file().save(&store)?;
        report.total = store.len();

        log::info!(
            "built store with {} sections ({} failed)",
            report.embedded,
            report.failed.len()
        );

        Ok(report)
    }

    /// Embed only sections missing from the store and merge them in.
    ///
    /// Sections already present keep their vectors even if the note changed.
    /// When nothing is missing, no prompt is shown and the store file is not
    /// touched.
    pub fn update(&self) -> Result<BuildReport, SemanticSearchError> {
        let _lock = self.lock()?;
        let _span = tracing::info_span!("update", vault = %self.vault.display()).entered();

        let store_file = self.store_file();
        let mut store = store_file.load_or_empty(self.client.model())?;
        if store.is_empty() {
            store = EmbeddingStore::new(self.client.model());
        } else if store.model() != self.client.model() {
            return Err(IndexError::ModelMismatch {
                expected: store.model().to_string(),
                got: self.client.model().to_string(),
            }
            .into());
        }

        let pending: Vec<Section> = self
            .load_sections()?
            .into_iter()
            .filter(|s| !store.contains(&s.key))
            .collect();

        if pending.is_empty() {
            log::info!("store is up to date, nothing to embed");
            return Ok(BuildReport {
                total: store.len(),
                ..Default::default()
            });
        }

        self.confirm(&pending)?;

        let mut fresh = EmbeddingStore::with_capacity(self.client.model(), pending.len());
        let mut report = self.embed_sections(&pending, store.dimensions(), &mut fresh);
        if report.embedded == 0 {
            log::warn!("no new section could be embedded, store left unchanged");
            report.total = store.len();
            return Ok(report);
        }

        store.merge(fresh)?;
        store.set_updated_at(Utc::now());
        store_file.save(&store)?;
        report.total = store.len();

        log::info!(
            "added {} sections ({} failed), store now holds {}",
            report.embedded,
            report.failed.len(),
            report.total
        );

        Ok(report)
    }

    /// Rank every stored section against `text` and keep the best `top_n`.
    pub fn query(&self, text: &str, top_n: usize) -> Result<Vec<RankedSection>, SemanticSearchError> {
        let _lock = self.lock()?;
        let _span = tracing::info_span!("query", top_n).entered();

        let store = self.store_file().load().map_err(|e| match e {
            StoreError::NotFound(path) => SemanticSearchError::StoreNotFound(path),
            e => e.into(),
        })?;
        if store.model() != self.client.model() {
            log::warn!(
                "store was built with {} but queries use {}",
                store.model(),
                self.client.model()
            );
        }

        let mut cache = QueryCache::load(self.config.cache_path())?;
        let vector = cache.get_or_compute(text, &self.client)?;

        let mut ranked = rank(&vector, &store)?;
        ranked.truncate(top_n);

        Ok(ranked)
    }

    /// Compare the persisted store with the vault. Makes no provider calls.
    pub fn status(&self) -> Result<StatusReport, SemanticSearchError> {
        let store_file = self.store_file();
        let store = match store_file.load() {
            Ok(store) => Some(store),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let cache = QueryCache::load(self.config.cache_path())?;
        let sections = self.load_sections()?;

        let mut report = StatusReport {
            store_path: store_file.path().to_path_buf(),
            store_present: store.is_some(),
            model: None,
            sections: 0,
            documents: 0,
            dimensions: None,
            updated_at: None,
            cache_entries: cache.len(),
            pending: sections.len(),
            orphaned: 0,
            stale_documents: Vec::new(),
        };

        let Some(store) = store else {
            return Ok(report);
        };

        let documents = store.documents();
        let in_vault: HashSet<&SectionKey> = sections.iter().map(|s| &s.key).collect();

        report.model = Some(store.model().to_string());
        report.sections = store.len();
        report.documents = documents.len();
        report.dimensions = store.dimensions();
        report.updated_at = store.updated_at();
        report.pending = sections.iter().filter(|s| !store.contains(&s.key)).count();
        report.orphaned = store.keys().filter(|k| !in_vault.contains(k)).count();

        if let Some(updated_at) = store.updated_at() {
            let cutoff = SystemTime::from(updated_at);
            report.stale_documents = documents
                .iter()
                .map(|(doc, _)| *doc)
                .filter(|doc| {
                    std::fs::metadata(self.vault.join(doc))
                        .and_then(|m| m.modified())
                        .map(|modified| modified > cutoff)
                        .unwrap_or(false)
                })
                .map(str::to_string)
                .collect();
        }

        Ok(report)
    }

    fn confirm(&self, sections: &[Section]) -> Result<(), SemanticSearchError> {
        let estimate = CostEstimate::compute(
            sections,
            self.counter.as_ref(),
            self.config.price_per_token,
        );
        log::debug!("cost estimate: {estimate}");

        if self.confirmer.confirm(&estimate) {
            Ok(())
        } else {
            Err(SemanticSearchError::Cancelled)
        }
    }

    /// Embed `sections` in order into `store`.
    ///
    /// Provider failures and unusable vectors are recorded and skipped.
    /// `expected_dimensions` pins the vector size when merging into an
    /// existing store.
    fn embed_sections(
        &self,
        sections: &[Section],
        expected_dimensions: Option<usize>,
        store: &mut EmbeddingStore,
    ) -> BuildReport {
        let mut report = BuildReport {
            candidates: sections.len(),
            ..Default::default()
        };
        let context_length = self.config.context_length;

        let progress = if self.show_progress {
            ProgressBar::new(sections.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {wide_msg}")
        {
            progress.set_style(style);
        }

        for section in sections {
            let key = &section.key;
            progress.set_message(key.to_string());

            let mut block = section.block();
            if self.counter.count(&block) > context_length {
                log::warn!("{key} exceeds {context_length} tokens, truncating");
                block = self.counter.truncate(&block, context_length);
                report.truncated.push(key.clone());
            }

            let outcome = self.client.embed(&block).map_err(|e| e.to_string()).and_then(|vector| {
                match expected_dimensions {
                    Some(expected) if vector.len() != expected => Err(
                        IndexError::DimensionMismatch {
                            expected,
                            got: vector.len(),
                        }
                        .to_string(),
                    ),
                    _ => store.insert(key.clone(), vector).map_err(|e| e.to_string()),
                }
            });

            match outcome {
                Ok(()) => report.embedded += 1,
                Err(reason) => {
                    log::warn!("failed to embed {key}: {reason}");
                    report.failed.push(key.clone());
                }
            }

            progress.inc(1);
        }

        progress.finish_and_clear();
        report
    }
}
