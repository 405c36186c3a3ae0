//! Data models shared across the pipeline stages.
//!
//! - [`Article`]: extracted content for one admitted URL
//! - [`SummaryResult`]: per-article summarization outcome (success or failure)
//! - [`ComposedArticle`]: the unified Markdown digest
//! - [`RunMetrics`]: counters emitted as one structured log line per run

use serde::Serialize;

/// A readable article extracted from an admitted URL.
#[derive(Debug, Clone)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub text: String,
    /// Publication date as found in page metadata, when present.
    pub publish_date: Option<String>,
}

/// Outcome of summarizing one article.
///
/// Failed summaries keep their URL and title so metrics and logs can name the
/// article, but carry no points and are excluded from composition input.
#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub url: String,
    pub title: String,
    pub points: Vec<String>,
    pub success: bool,
    pub estimated_tokens: u64,
}

impl SummaryResult {
    pub fn failed(url: String, title: String, estimated_tokens: u64) -> Self {
        Self {
            url,
            title,
            points: Vec::new(),
            success: false,
            estimated_tokens,
        }
    }
}

/// The unified digest produced by the composer.
#[derive(Debug, Clone)]
pub struct ComposedArticle {
    pub title: String,
    pub markdown: String,
}

/// Counters assembled at the end of every run and logged on each terminal
/// path, success or failure. Never persisted.
#[derive(Debug, Default, Serialize)]
pub struct RunMetrics {
    /// Admissible, uncached URLs discovered this run, counted before any
    /// page fetch and before the article ceiling.
    pub articles_collected: usize,
    /// Articles actually extracted: after the ceiling, minus per-URL fetch
    /// and extraction failures.
    pub articles_after_limit: usize,
    pub summaries_generated: usize,
    pub summaries_failed: usize,
    pub tokens_estimated: u64,
    pub token_limit_reached: bool,
    pub published: bool,
    pub duration_seconds: f64,
}
