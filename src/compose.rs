//! Composition of the unified digest and draft persistence.
//!
//! Exactly one LLM call turns the successful per-article summaries into a
//! single Markdown article with a heading, an introduction, thematic
//! sections, a closing synthesis, and a references section linking every
//! source. The 1200–1600 character target band is enforced by warning only;
//! there is no truncation or regeneration on violation.

use crate::error::{Error, Result};
use crate::llm::CompletionProvider;
use crate::models::{ComposedArticle, SummaryResult};
use crate::prompts::{render, PromptStore};
use crate::retry::{with_backoff, Backoff};
use std::path::Path;
use tracing::{info, warn};

/// Soft bounds on the composed article, in characters.
pub const TARGET_MIN_CHARS: usize = 1200;
pub const TARGET_MAX_CHARS: usize = 1600;

/// Used when the composed Markdown carries no heading to take a title from.
pub const DEFAULT_TITLE: &str = "Tech News Digest";

const MAX_TITLE_CHARS: usize = 100;

/// Compose one article from the successful summaries.
///
/// Zero successful summaries is run-fatal: there is nothing meaningful to
/// publish and the orchestrator must surface the condition instead of
/// shipping an empty article.
pub async fn compose_article(
    summaries: &[SummaryResult],
    provider: &dyn CompletionProvider,
    prompts: &PromptStore,
) -> Result<ComposedArticle> {
    let successful: Vec<&SummaryResult> = summaries.iter().filter(|s| s.success).collect();
    if successful.is_empty() {
        return Err(Error::NoSummaries);
    }

    let system_prompt = prompts.load("compose/system")?;
    let user_template = prompts.load("compose/user")?;
    let block = build_summaries_block(&successful);
    let user_prompt = render(&user_template, &[("summaries", &block)]);

    info!(sources = successful.len(), "Composing unified article");
    let markdown = with_backoff(&Backoff::default(), "llm.compose", || {
        // Some model tiers reject non-default temperatures; leave it unset.
        provider.complete(&system_prompt, &user_prompt, None)
    })
    .await?;
    let markdown = markdown.trim().to_string();

    let char_count = markdown.chars().count();
    if char_count < TARGET_MIN_CHARS || char_count > TARGET_MAX_CHARS {
        warn!(
            char_count,
            min = TARGET_MIN_CHARS,
            max = TARGET_MAX_CHARS,
            "Composed article outside target length band"
        );
    } else {
        info!(char_count, "Article composed");
    }

    let title = extract_title(&markdown).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    Ok(ComposedArticle { title, markdown })
}

/// Concatenate all summaries into the composer's input block, in collection
/// order, each with title, source URL, and bullet points.
fn build_summaries_block(summaries: &[&SummaryResult]) -> String {
    let mut block = String::new();
    for (i, summary) in summaries.iter().enumerate() {
        block.push_str(&format!("\n### Article {}: {}\n", i + 1, summary.title));
        block.push_str(&format!("Source: {}\n", summary.url));
        block.push_str("Key points:\n");
        for point in &summary.points {
            block.push_str(&format!("- {point}\n"));
        }
    }
    block
}

/// First `#`/`##` heading line of the Markdown, capped at 100 characters.
pub fn extract_title(markdown: &str) -> Option<String> {
    for line in markdown.lines() {
        let line = line.trim();
        if line.starts_with("# ") || line.starts_with("## ") {
            let title: String = line
                .trim_start_matches('#')
                .trim()
                .chars()
                .take(MAX_TITLE_CHARS)
                .collect();
            if !title.is_empty() {
                return Some(title);
            }
        }
    }
    None
}

/// Write the draft (or error report) to `path`, creating parent directories
/// and overwriting any previous content.
pub async fn save_draft(markdown: &str, path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, markdown).await?;
    info!(path = %path.display(), "Draft saved");
    Ok(())
}
