//! Cost estimate and the confirmation gate in front of every embedding run.

use std::collections::BTreeSet;
use std::fmt;

use inquire::error::InquireResult;

use crate::notes::Section;
use crate::semantic::tokens::TokenCounter;

/// Tokens, notes and blocks about to be embedded, and what they cost.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub tokens: usize,
    pub notes: usize,
    pub sections: usize,
    pub price: f64,
}

impl CostEstimate {
    /// Count the exact tokens of every block in `sections`.
    pub fn compute(sections: &[Section], counter: &dyn TokenCounter, price_per_token: f64) -> Self {
        let tokens: usize = sections.iter().map(|s| counter.count(&s.block())).sum();
        let notes = sections
            .iter()
            .map(|s| s.key.document.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Self {
            tokens,
            notes,
            sections: sections.len(),
            price: tokens as f64 * price_per_token,
        }
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} notes; {} blocks; {} tokens => cost = ${:.4}",
            self.notes, self.sections, self.tokens, self.price
        )
    }
}

/// Asks the user whether to go ahead with a paid embedding run.
pub trait Confirmer {
    fn confirm(&self, estimate: &CostEstimate) -> bool;
}

/// Interactive terminal prompt.
pub struct InquireConfirmer;

impl Confirmer for InquireConfirmer {
    fn confirm(&self, estimate: &CostEstimate) -> bool {
        eprintln!("{estimate}");
        match inquire::prompt_confirmation("Proceed with embedding? [y/n]") {
            InquireResult::Ok(answer) => answer,
            InquireResult::Err(err) => {
                log::warn!("confirmation prompt failed: {err}");
                false
            }
        }
    }
}

/// Accepts every estimate (`--yes`).
pub struct AssumeYes;

impl Confirmer for AssumeYes {
    fn confirm(&self, estimate: &CostEstimate) -> bool {
        eprintln!("{estimate}");
        true
    }
}
