//! Per-article summarization with bounded concurrency and token budgeting.
//!
//! A scheduling pre-pass charges each article's token estimate against the
//! run budget; once the ceiling would be crossed, the remaining articles are
//! skipped (not failed) and the partial batch proceeds. Scheduled work then
//! runs through a bounded pool of at most [`SUMMARY_CONCURRENCY`] in-flight
//! LLM calls. Each call goes through the retry wrapper; a call that still
//! fails yields a `success=false` record and never aborts the batch.
//!
//! Results are re-associated with their source article by index, so the
//! composer sees collection order no matter how completions interleave.

use crate::budget::RunBudget;
use crate::error::Result;
use crate::llm::CompletionProvider;
use crate::models::{Article, SummaryResult};
use crate::prompts::{render, PromptStore};
use crate::retry::{with_backoff, Backoff};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, warn};

/// Maximum simultaneous in-flight LLM calls.
pub const SUMMARY_CONCURRENCY: usize = 5;

/// Bullet points kept per article.
const MAX_SUMMARY_POINTS: usize = 5;

/// Parsed lines at or below this many characters are discarded as noise.
const MIN_POINT_CHARS: usize = 10;

/// Article body is truncated to this many characters before prompting.
const MAX_BODY_CHARS: usize = 3000;

/// List markers stripped from the front of each response line: dashes,
/// asterisks, bullets, and numeric prefixes like `1.` or `2)`.
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\-*•]*(?:\d+[.)]\s*)?").unwrap());

/// Outcome of the summarization stage.
#[derive(Debug)]
pub struct SummarizeOutcome {
    /// One record per attempted article, in collection order. Articles
    /// skipped for budget reasons have no record at all.
    pub results: Vec<SummaryResult>,
    pub failed: usize,
    pub skipped_for_budget: usize,
}

impl SummarizeOutcome {
    pub fn limit_reached(&self) -> bool {
        self.skipped_for_budget > 0
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Rudimentary token estimate: roughly four characters per token, plus a
/// fixed allowance for the prompt scaffolding and the response.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 100;
    }
    ((text.chars().count() / 4) as u64 + 200).max(100)
}

/// Summarize `articles`, spending against `budget`.
pub async fn summarize_articles(
    articles: &[Article],
    provider: &dyn CompletionProvider,
    prompts: &PromptStore,
    budget: &mut RunBudget,
) -> Result<SummarizeOutcome> {
    let system_prompt = prompts.load("summarize/system")?;
    let user_template = prompts.load("summarize/user")?;

    // Budget pre-pass: decide up front which articles this run can afford.
    let mut scheduled: Vec<(usize, &Article, u64)> = Vec::new();
    let mut skipped_for_budget = 0usize;
    for (index, article) in articles.iter().enumerate() {
        let estimate = estimate_tokens(&article.text);
        if !budget.try_spend_tokens(estimate) {
            skipped_for_budget = articles.len() - index;
            warn!(
                skipped = skipped_for_budget,
                "Token ceiling reached; remaining articles not attempted this run"
            );
            break;
        }
        scheduled.push((index, article, estimate));
    }

    let total = articles.len();
    let backoff = Backoff::default();
    let mut completed: Vec<(usize, SummaryResult)> = stream::iter(scheduled)
        .map(|(index, article, estimate)| {
            let system_prompt = &system_prompt;
            let user_template = &user_template;
            let backoff = &backoff;
            async move {
                info!(
                    index = index + 1,
                    total,
                    title = %article.title.chars().take(50).collect::<String>(),
                    "Summarizing article"
                );
                let result =
                    summarize_one(article, provider, system_prompt, user_template, backoff)
                        .await;
                let summary = match result {
                    Ok(points) => SummaryResult {
                        url: article.url.clone(),
                        title: article.title.clone(),
                        points,
                        success: true,
                        estimated_tokens: estimate,
                    },
                    Err(e) => {
                        error!(url = %article.url, error = %e, "Summarization failed; skipping article");
                        SummaryResult::failed(article.url.clone(), article.title.clone(), estimate)
                    }
                };
                (index, summary)
            }
        })
        .buffer_unordered(SUMMARY_CONCURRENCY)
        .collect()
        .await;

    completed.sort_by_key(|(index, _)| *index);
    let results: Vec<SummaryResult> = completed.into_iter().map(|(_, r)| r).collect();
    let failed = results.iter().filter(|r| !r.success).count();

    info!(
        succeeded = results.len() - failed,
        total,
        failed,
        skipped = skipped_for_budget,
        "Summarization completed"
    );

    Ok(SummarizeOutcome {
        results,
        failed,
        skipped_for_budget,
    })
}

async fn summarize_one(
    article: &Article,
    provider: &dyn CompletionProvider,
    system_prompt: &str,
    user_template: &str,
    backoff: &Backoff,
) -> Result<Vec<String>> {
    let truncated: String = article.text.chars().take(MAX_BODY_CHARS).collect();
    let user_prompt = render(
        user_template,
        &[("title", &article.title), ("body", &truncated)],
    );

    let response = with_backoff(backoff, "llm.summarize", || {
        provider.complete(system_prompt, &user_prompt, None)
    })
    .await?;

    Ok(parse_bullet_points(&response))
}

/// Turn a free-form LLM response into bullet points.
///
/// Strips list markers, drops empty and too-short lines, and keeps the first
/// five. When fewer than three well-formed points survive, the raw response
/// is kept as a single block, degraded but usable.
pub fn parse_bullet_points(response: &str) -> Vec<String> {
    let points: Vec<String> = response
        .lines()
        .map(|line| LIST_MARKER.replace(line.trim(), "").trim().to_string())
        .filter(|line| line.chars().count() > MIN_POINT_CHARS)
        .take(MAX_SUMMARY_POINTS)
        .collect();

    if points.len() < 3 {
        warn!(
            recovered = points.len(),
            "Too few well-formed points; using raw response as a single block"
        );
        return vec![response.trim().to_string()];
    }
    points
}
