//! # RSS Digest
//!
//! A news digest pipeline that collects articles from configured RSS/Atom
//! feeds, summarizes each one through an LLM, composes the summaries into a
//! single Markdown article, and optionally publishes it as a WordPress draft.
//!
//! ## Features
//!
//! - Feed collection with order-preserving dedupe and a TTL cache of
//!   already-processed URLs
//! - HTTPS-only fetching restricted to an operator-maintained domain
//!   allowlist, with DNS resolution checked against private address space
//! - Parallel summarization (5 at a time) with retry/backoff and per-run
//!   article and token ceilings
//! - OpenAI or Anthropic as the completion backend
//! - Optional WordPress publishing with keyword-based categories/tags and an
//!   Unsplash cover image
//!
//! ## Usage
//!
//! ```sh
//! rss_digest                  # configuration from .env
//! rss_digest --profile weekly # overlay .env.weekly, use "weekly" prompts
//! ```
//!
//! Exit codes: 0 on success, 1 on failure (an error report is written to the
//! draft path), 2 when no new articles were found.

use clap::Parser;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod budget;
mod cache;
mod categorize;
mod cli;
mod collect;
mod compose;
mod config;
mod error;
mod image;
mod llm;
mod models;
mod pipeline;
mod prompts;
mod retry;
mod security;
mod summarize;
mod wordpress;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!("rss_digest starting up");

    let args = Cli::parse();
    if let Some(path) = &args.draft_path {
        // Make the CLI override visible to Config::from_env.
        std::env::set_var("DRAFT_PATH", path);
    }
    config::load_env_files(args.profile.as_deref());

    let status = pipeline::run().await;
    ExitCode::from(status.exit_code())
}
