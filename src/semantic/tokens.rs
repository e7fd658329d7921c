//! Token counting with the embedding model's own tokenizer.

use tiktoken_rs::CoreBPE;

#[derive(Debug, thiserror::Error)]
#[error("Tokenizer initialization failed: {0}")]
pub struct TokenizerError(String);

/// Exact token accounting for embedding inputs.
pub trait TokenCounter {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// Longest prefix of `text` that fits in `max_tokens` tokens.
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// `cl100k_base` BPE, the encoding of the OpenAI embedding models.
pub struct Cl100kCounter {
    bpe: CoreBPE,
}

impl Cl100kCounter {
    pub fn new() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| TokenizerError(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        // A cut can land inside a multi-token character; back off until it decodes.
        let mut end = max_tokens;
        while end > 0 {
            if let Ok(prefix) = self.bpe.decode(tokens[..end].to_vec()) {
                return prefix;
            }
            end -= 1;
        }

        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_known_string() {
        let counter = Cl100kCounter::new().unwrap();
        // "hello world" is two tokens in cl100k_base
        assert_eq!(counter.count("hello world"), 2);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        let counter = Cl100kCounter::new().unwrap();
        assert_eq!(counter.truncate("hello world", 10), "hello world");
    }

    #[test]
    fn test_truncate_to_limit() {
        let counter = Cl100kCounter::new().unwrap();
        let text = "word ".repeat(100);

        let truncated = counter.truncate(&text, 10);
        assert!(text.starts_with(&truncated));
        assert_eq!(counter.count(&truncated), 10);
    }
}
