//! Deterministic stand-ins for the provider, tokenizer and prompt.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::config::Config;
use crate::semantic::{
    Confirmer, CostEstimate, EmbeddingClient, EmbeddingError, EmbeddingProvider, RetryPolicy,
    SemanticSearchService, TokenCounter,
};

pub const STUB_MODEL: &str = "stub-embedding";
const STUB_DIMENSIONS: usize = 16;

/// Hashes the bytes of the input into a fixed-size vector and logs every call.
///
/// Inputs containing `fail_on` are rejected with a non-retryable error and
/// inputs containing `zero_on` come back as an all-zero vector.
pub struct HashProvider {
    pub calls: Rc<RefCell<Vec<String>>>,
    pub fail_on: Option<String>,
    pub zero_on: Option<String>,
    pub dimensions: usize,
}

impl HashProvider {
    pub fn new() -> (Self, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                calls: calls.clone(),
                fail_on: None,
                zero_on: None,
                dimensions: STUB_DIMENSIONS,
            },
            calls,
        )
    }

    pub fn failing_on(marker: &str) -> (Self, Rc<RefCell<Vec<String>>>) {
        let (mut provider, calls) = Self::new();
        provider.fail_on = Some(marker.to_string());
        (provider, calls)
    }

    pub fn zero_on(marker: &str) -> (Self, Rc<RefCell<Vec<String>>>) {
        let (mut provider, calls) = Self::new();
        provider.zero_on = Some(marker.to_string());
        (provider, calls)
    }

    pub fn with_dimensions(dimensions: usize) -> (Self, Rc<RefCell<Vec<String>>>) {
        let (mut provider, calls) = Self::new();
        provider.dimensions = dimensions;
        (provider, calls)
    }
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    hash_vector_sized(text, STUB_DIMENSIONS)
}

fn hash_vector_sized(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    for (i, byte) in text.bytes().enumerate() {
        vector[(byte as usize + i) % dimensions] += 1.0;
    }
    vector[dimensions - 1] += 1.0;
    vector
}

impl EmbeddingProvider for HashProvider {
    fn model(&self) -> &str {
        STUB_MODEL
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.borrow_mut().push(text.to_string());
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::Status {
                    status: 400,
                    body: "rejected".to_string(),
                });
            }
        }
        if let Some(marker) = &self.zero_on {
            if text.contains(marker.as_str()) {
                return Ok(vec![0.0; self.dimensions]);
            }
        }
        Ok(hash_vector_sized(text, self.dimensions))
    }
}

/// One token per whitespace-separated word.
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        text.split_whitespace()
            .take(max_tokens)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Gives the same answer every time and counts how often it was asked.
pub struct StaticConfirmer {
    answer: bool,
    asked: Rc<Cell<u32>>,
}

impl StaticConfirmer {
    pub fn new(answer: bool) -> (Self, Rc<Cell<u32>>) {
        let asked = Rc::new(Cell::new(0));
        (
            Self {
                answer,
                asked: asked.clone(),
            },
            asked,
        )
    }
}

impl Confirmer for StaticConfirmer {
    fn confirm(&self, _estimate: &CostEstimate) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}

pub fn write_note(vault: &Path, relative: &str, content: &str) -> PathBuf {
    let path = vault.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Vault with two atoms, a molecule, a source, a topic page and a template.
pub fn sample_vault(vault: &Path) {
    write_note(vault, "Atoms/Entropy.md", "#atom\nA measure of disorder.\n---\ncreated: 2023-01-01\n");
    write_note(vault, "Atoms/Gradient.md", "#atom\nDirection of steepest ascent.\n");
    write_note(
        vault,
        "Molecules/Learning.md",
        "#molecule\nHow models learn.\n## Loss\nWe minimize [[Entropy]].\n## Optimizer\nFollow the **gradient**.\n",
    );
    write_note(vault, "Sources/Book.md", "#source\nauthor: Someone\n---\nA book about [learning](https://example.com).\n");
    write_note(vault, "Topics/ML.md", "#topic\n[[Learning]]\n");
    write_note(vault, "_templates/Atom.md", "#atom\n{{title}}\n");
}

/// Everything a pipeline test needs, rooted in one temp dir.
pub struct Harness {
    pub _tmp: tempfile::TempDir,
    pub vault: PathBuf,
    pub data_dir: PathBuf,
    pub calls: Rc<RefCell<Vec<String>>>,
    pub asked: Rc<Cell<u32>>,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let vault = tmp.path().join("vault");
        let data_dir = vault.join("_scripts");
        std::fs::create_dir_all(&vault).unwrap();
        Self {
            _tmp: tmp,
            vault,
            data_dir,
            calls: Rc::new(RefCell::new(Vec::new())),
            asked: Rc::new(Cell::new(0)),
        }
    }

    pub fn config(&self) -> Config {
        Config::with_base_path(&self.data_dir)
    }

    /// Service with a hash provider and a confirmer answering `confirm`.
    pub fn service(&mut self, confirm: bool) -> SemanticSearchService {
        self.service_with(self.config(), HashProvider::new().0, confirm)
    }

    pub fn service_with(
        &mut self,
        config: Config,
        provider: HashProvider,
        confirm: bool,
    ) -> SemanticSearchService {
        self.calls = provider.calls.clone();
        let (confirmer, asked) = StaticConfirmer::new(confirm);
        self.asked = asked;

        let client = EmbeddingClient::new(Box::new(provider), RetryPolicy::none(), Duration::ZERO);
        SemanticSearchService::new(
            config,
            self.vault.clone(),
            client,
            Box::new(WordCounter),
            Box::new(confirmer),
        )
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}
