//! Semantic search over note sections with remote embeddings.
//!
//! Sections are embedded through an OpenAI-compatible provider, persisted in
//! a CSV store and ranked against a query vector by cosine similarity with a
//! full linear scan.
//!
//! # Architecture
//!
//! - `tokens`: Exact `cl100k_base` token counting and truncation
//! - `embeddings`: Provider trait, OpenAI client, retry policy
//! - `cost`: Cost estimate and confirmation gate
//! - `index`: In-memory embedding store keyed by section
//! - `storage`: CSV file I/O for embeddings.csv persistence
//! - `cache`: Persisted query embeddings
//! - `rank`: Cosine similarity ranking
//! - `service`: build / update / query / status orchestration

mod cache;
mod cost;
mod embeddings;
mod index;
mod rank;
mod service;
mod storage;
mod tokens;

pub use cost::{AssumeYes, Confirmer, CostEstimate, InquireConfirmer};
pub use embeddings::{EmbeddingClient, EmbeddingError, EmbeddingProvider, OpenAiProvider, RetryPolicy};
pub use rank::RankedSection;
pub use service::{BuildReport, SemanticSearchError, SemanticSearchService, StatusReport};
pub use storage::StoreFile;
pub use tokens::{Cl100kCounter, TokenCounter};
