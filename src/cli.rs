//! Command-line interface definitions.
//!
//! The binary takes almost everything from the environment (see
//! [`crate::config`]); the CLI only selects an optional profile and lets the
//! draft path be overridden for ad-hoc runs.

use clap::Parser;

/// Command-line arguments for the digest runner.
///
/// # Examples
///
/// ```sh
/// # Default profile, configuration from .env
/// rss_digest
///
/// # Load .env.weekly on top of .env and use the "weekly" prompt variant
/// rss_digest --profile weekly
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional profile name (loads `.env.<profile>` and selects the prompt variant)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Override the draft output path for this run
    #[arg(long, env = "DRAFT_PATH")]
    pub draft_path: Option<String>,
}
