//! Run orchestration: collect, summarize, compose, save, publish.
//!
//! A run moves through the stages in order and terminates in one of three
//! states: completed, nothing-to-do (no eligible articles this run), or
//! failed. Failures write an error report to the draft path so a scheduled
//! run always leaves an artifact behind; the nothing-to-do path deliberately
//! leaves the previous draft untouched. Run metrics are logged as one JSON
//! line on every terminal path.

use crate::budget::RunBudget;
use crate::cache::ArticleCache;
use crate::categorize::Categorizer;
use crate::collect::collect_articles;
use crate::compose::{compose_article, save_draft};
use crate::config::{Config, DEFAULT_DRAFT_PATH};
use crate::error::{Error, Result};
use crate::image::UnsplashClient;
use crate::llm::provider_from_config;
use crate::models::RunMetrics;
use crate::prompts::PromptStore;
use crate::security::load_allowlist;
use crate::summarize::summarize_articles;
use crate::wordpress;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Terminal state of a run, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    NothingToDo,
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Failed => 1,
            RunStatus::NothingToDo => 2,
        }
    }
}

enum Outcome {
    Completed,
    NothingToDo,
}

/// Execute one full run and report its terminal state.
pub async fn run() -> RunStatus {
    run_with(Config::from_env(), DEFAULT_DRAFT_PATH).await
}

/// Drive a run from an already-loaded (or failed) configuration. The metrics
/// line is emitted on every terminal path, a failed configuration load
/// included; `fallback_draft_path` receives the error report when no
/// configured draft path exists yet.
async fn run_with(config: Result<Config>, fallback_draft_path: &str) -> RunStatus {
    let started = Instant::now();
    let mut metrics = RunMetrics::default();

    let status = match config {
        Err(e) => {
            error!(error = %e, "Configuration error");
            write_error_report(&e, fallback_draft_path).await;
            RunStatus::Failed
        }
        Ok(config) => match execute(&config, &mut metrics).await {
            Ok(Outcome::Completed) => RunStatus::Completed,
            Ok(Outcome::NothingToDo) => RunStatus::NothingToDo,
            Err(e) => {
                error!(error = %e, "Run failed");
                write_error_report(&e, &config.draft_path).await;
                RunStatus::Failed
            }
        },
    };

    metrics.duration_seconds = started.elapsed().as_secs_f64();
    match serde_json::to_string(&metrics) {
        Ok(json) => info!(metrics = %json, "Run metrics"),
        Err(e) => warn!(error = %e, "Metrics serialization failed"),
    }
    info!(?status, "Run finished");
    status
}

async fn execute(config: &Config, metrics: &mut RunMetrics) -> Result<Outcome> {
    // An unusable allowlist is fatal: without it every URL would have to be
    // rejected, which is indistinguishable from a silently broken run.
    let allowlist = load_allowlist(&config.allowlist_path)?;
    let mut cache = ArticleCache::load(&config.cache_path, config.cache_ttl_hours);
    let mut budget = RunBudget::new(config.max_articles_per_run, config.max_tokens_per_run);

    let http = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("rss_digest/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let collected = collect_articles(
        &http,
        &config.rss_feeds,
        &mut cache,
        &allowlist,
        budget.remaining_articles(),
    )
    .await;
    metrics.articles_collected = collected.eligible_urls;
    metrics.articles_after_limit = collected.articles.len();

    if collected.articles.is_empty() {
        info!("No new articles this run; nothing to do");
        return Ok(Outcome::NothingToDo);
    }
    budget.record_articles(collected.articles.len());

    let prompts = PromptStore::new(&config.prompts_dir, &config.prompt_variant);
    let provider = provider_from_config(config)?;

    let outcome =
        summarize_articles(&collected.articles, provider.as_ref(), &prompts, &mut budget).await?;
    metrics.summaries_generated = outcome.succeeded();
    metrics.summaries_failed = outcome.failed;
    metrics.tokens_estimated = budget.tokens_spent();
    metrics.token_limit_reached = outcome.limit_reached();

    let article = compose_article(&outcome.results, provider.as_ref(), &prompts).await?;
    save_draft(&article.markdown, &config.draft_path).await?;

    if let Some(wp_config) = &config.wordpress {
        let categorizer = Categorizer::load(&config.category_config_path);
        let unsplash = config
            .unsplash_access_key
            .clone()
            .map(UnsplashClient::new);
        let post =
            wordpress::publish_article(&article, wp_config, &categorizer, unsplash.as_ref())
                .await?;
        metrics.published = true;
        info!(post_id = post.id, url = %post.url, "Published WordPress draft");
    } else {
        info!("WordPress not configured; local draft only");
    }

    // Cache only what was actually summarized: failed and budget-skipped
    // articles stay eligible for the next run.
    for result in outcome.results.iter().filter(|r| r.success) {
        if let Err(e) = cache.add(&result.url) {
            warn!(url = %result.url, error = %e, "Cache update failed");
        }
    }

    Ok(Outcome::Completed)
}

/// Markdown error report written to the draft path on failure.
fn error_report(error: &Error) -> String {
    format!(
        "# Digest Run Failed\n\nGenerated: {}\n\nError: {error}\n",
        Utc::now().to_rfc3339()
    )
}

async fn write_error_report(error: &Error, path: &str) {
    if let Err(e) = save_draft(&error_report(error), path).await {
        warn!(path, error = %e, "Could not write error report");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::extract_article;
    use crate::config::Provider;
    use crate::llm::CompletionProvider;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config_for(dir: &std::path::Path) -> Config {
        Config {
            provider: Provider::OpenAi,
            // Reserved TLD: resolution always fails, so the feed is skipped.
            rss_feeds: vec!["https://feeds.invalid/rss.xml".to_string()],
            cache_ttl_hours: 24,
            cache_path: dir.join("cache.json").to_str().unwrap().to_string(),
            allowlist_path: dir.join("allowlist.txt").to_str().unwrap().to_string(),
            draft_path: dir.join("draft.md").to_str().unwrap().to_string(),
            max_articles_per_run: None,
            max_tokens_per_run: None,
            wordpress: None,
            category_config_path: dir.join("keywords.json").to_str().unwrap().to_string(),
            unsplash_access_key: None,
            prompts_dir: "prompts".to_string(),
            prompt_variant: "default".to_string(),
            openai_api_key: Some("sk-test".to_string()),
            openai_model: "gpt-4-turbo-preview".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            anthropic_api_key: None,
            anthropic_model: "claude-3-sonnet-20240229".to_string(),
        }
    }

    #[tokio::test]
    async fn test_config_failure_still_emits_metrics_and_error_report() {
        let dir = tempdir().unwrap();
        let draft = dir.path().join("draft.md");

        let buf = Arc::new(Mutex::new(Vec::new()));
        let writer = LogBuffer(buf.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let status = run_with(
            Err(Error::Config("RSS_FEEDS is required".to_string())),
            draft.to_str().unwrap(),
        )
        .await;

        assert_eq!(status, RunStatus::Failed);
        let logs = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Configuration error"));
        assert!(logs.contains("Run metrics"));
        assert!(std::fs::read_to_string(&draft)
            .unwrap()
            .contains("Digest Run Failed"));
    }

    #[tokio::test]
    async fn test_no_new_articles_leaves_previous_draft_untouched() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        std::fs::write(&config.allowlist_path, "news.example\n").unwrap();
        std::fs::write(&config.draft_path, "yesterday's digest").unwrap();

        let mut metrics = RunMetrics::default();
        let outcome = execute(&config, &mut metrics).await.unwrap();

        assert!(matches!(outcome, Outcome::NothingToDo));
        assert_eq!(metrics.articles_collected, 0);
        assert!(!metrics.published);
        assert_eq!(
            std::fs::read_to_string(&config.draft_path).unwrap(),
            "yesterday's digest"
        );
    }

    /// Answers summarize prompts with bullet points and the compose prompt
    /// with a finished digest, keyed off the prompt shape.
    struct ScriptedProvider;

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _temperature: Option<f32>,
        ) -> crate::error::Result<String> {
            if user.contains("Key points:") {
                Ok("# Daily Digest\n\nA quantum computing milestone. \
                    More detail follows in the sections below.\n\n\
                    ## References\n- https://news.example/quantum\n"
                    .to_string())
            } else {
                Ok("\
- Researchers announced a working error-corrected qubit array
- The prototype ran for a full hour without decoherence
- Commercial partners plan pilot deployments next year
- Funding for the lab tripled after the announcement
- Rival groups are attempting to replicate the result"
                    .to_string())
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_round_trip_extract_summarize_compose_cache() {
        let html = format!(
            r#"<html><head><title>Quantum Milestone</title></head><body>
            <article><p>{}</p></article></body></html>"#,
            "Quantum news body text. ".repeat(25)
        );
        let url = "https://news.example/quantum";
        let article = extract_article(url, &html).unwrap();

        let dir = tempdir().unwrap();
        let prompt_root = dir.path().join("prompts/default");
        std::fs::create_dir_all(&prompt_root).unwrap();
        std::fs::write(prompt_root.join("default_summarize_system.txt"), "s").unwrap();
        std::fs::write(
            prompt_root.join("default_summarize_user.txt"),
            "Title: {title}\n{body}",
        )
        .unwrap();
        std::fs::write(prompt_root.join("default_compose_system.txt"), "s").unwrap();
        std::fs::write(
            prompt_root.join("default_compose_user.txt"),
            "Key points:\n{summaries}",
        )
        .unwrap();
        let prompts = PromptStore::new(dir.path().join("prompts"), "default");

        let provider = ScriptedProvider;
        let mut budget = RunBudget::new(None, None);
        let outcome = summarize_articles(&[article], &provider, &prompts, &mut budget)
            .await
            .unwrap();
        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(outcome.results[0].points.len(), 5);

        let composed = compose_article(&outcome.results, &provider, &prompts)
            .await
            .unwrap();
        assert_eq!(composed.title, "Daily Digest");
        assert!(composed.markdown.contains(url));

        let draft_path = dir.path().join("out/draft.md");
        save_draft(&composed.markdown, draft_path.to_str().unwrap())
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&draft_path)
            .unwrap()
            .contains("## References"));

        let mut cache = ArticleCache::load(dir.path().join("cache.json"), 24);
        for result in outcome.results.iter().filter(|r| r.success) {
            cache.add(&result.url).unwrap();
        }
        assert!(cache.is_cached(url));
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(RunStatus::Completed.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::NothingToDo.exit_code(), 2);
    }

    #[test]
    fn test_error_report_names_the_error() {
        let report = error_report(&Error::NoSummaries);
        assert!(report.starts_with("# Digest Run Failed"));
        assert!(report.contains("Generated: "));
        assert!(report.contains("Error: "));
    }
}
