//! Per-run resource ceilings.
//!
//! Two independent limits guard a run: a cap on articles processed and a cap
//! on estimated LLM tokens. Hitting a ceiling truncates remaining work rather
//! than aborting; whatever was already produced continues downstream. Both
//! ceilings treat `None` (unset or `0` in configuration) as unlimited.

use tracing::warn;

/// Monotonic in-memory budget counters for a single run.
#[derive(Debug)]
pub struct RunBudget {
    max_articles: Option<usize>,
    max_tokens: Option<u64>,
    articles_seen: usize,
    tokens_spent: u64,
}

impl RunBudget {
    pub fn new(max_articles: Option<usize>, max_tokens: Option<u64>) -> Self {
        Self {
            max_articles,
            max_tokens,
            articles_seen: 0,
            tokens_spent: 0,
        }
    }

    /// How many more articles may be admitted; `None` means unlimited.
    pub fn remaining_articles(&self) -> Option<usize> {
        self.max_articles
            .map(|max| max.saturating_sub(self.articles_seen))
    }

    pub fn record_articles(&mut self, count: usize) {
        self.articles_seen += count;
    }

    /// Record an estimated token spend unless it would cross the ceiling.
    ///
    /// Returns `false` (and records nothing) when the ceiling would be
    /// exceeded, signalling the summarizer to stop issuing new calls.
    pub fn try_spend_tokens(&mut self, estimate: u64) -> bool {
        if let Some(max) = self.max_tokens {
            if self.tokens_spent + estimate > max {
                warn!(
                    max_tokens = max,
                    spent = self.tokens_spent,
                    estimate,
                    "Token ceiling would be exceeded; denying further LLM calls"
                );
                return false;
            }
        }
        self.tokens_spent += estimate;
        true
    }

    pub fn tokens_spent(&self) -> u64 {
        self.tokens_spent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_budget_never_denies() {
        let mut budget = RunBudget::new(None, None);
        assert_eq!(budget.remaining_articles(), None);
        for _ in 0..100 {
            assert!(budget.try_spend_tokens(1_000_000));
        }
    }

    #[test]
    fn test_article_ceiling_decrements() {
        let mut budget = RunBudget::new(Some(2), None);
        assert_eq!(budget.remaining_articles(), Some(2));
        budget.record_articles(2);
        assert_eq!(budget.remaining_articles(), Some(0));
        budget.record_articles(1);
        assert_eq!(budget.remaining_articles(), Some(0));
    }

    #[test]
    fn test_token_ceiling_denies_without_recording() {
        let mut budget = RunBudget::new(None, Some(500));
        assert!(budget.try_spend_tokens(300));
        assert!(!budget.try_spend_tokens(300));
        assert_eq!(budget.tokens_spent(), 300);
        // A smaller spend that fits still goes through.
        assert!(budget.try_spend_tokens(200));
        assert_eq!(budget.tokens_spent(), 500);
    }
}
