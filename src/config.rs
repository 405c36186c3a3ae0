//! Environment-backed run configuration.
//!
//! All knobs come from the environment, optionally seeded from `.env` and
//! `.env.<profile>` files. Configuration is loaded once per run and handed to
//! the pipeline as part of the run context; nothing reads the environment
//! after startup.

use crate::error::{Error, Result};
use std::fmt;
use tracing::info;

/// Which LLM backend handles completion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// WordPress credentials; publishing is skipped when absent.
#[derive(Debug, Clone)]
pub struct WordPressConfig {
    pub site_url: String,
    pub username: String,
    pub app_password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub rss_feeds: Vec<String>,
    pub cache_ttl_hours: i64,
    pub cache_path: String,
    pub allowlist_path: String,
    pub draft_path: String,
    pub max_articles_per_run: Option<usize>,
    pub max_tokens_per_run: Option<u64>,
    pub wordpress: Option<WordPressConfig>,
    pub category_config_path: String,
    pub unsplash_access_key: Option<String>,
    pub prompts_dir: String,
    pub prompt_variant: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
}

/// Default draft location, also used for the error report when configuration
/// itself fails to load.
pub const DEFAULT_DRAFT_PATH: &str = "out/draft.md";

/// Load `.env` and the optional `.env.<profile>` overlay.
///
/// Real environment variables always win. The profile file is applied before
/// the base file so profile values take precedence between the two. Selecting
/// a profile also defaults `PROMPT_VARIANT` to the profile name.
pub fn load_env_files(profile: Option<&str>) {
    if let Some(profile) = profile {
        if std::env::var("PROMPT_VARIANT").is_err() {
            std::env::set_var("PROMPT_VARIANT", profile);
        }
        let path = format!(".env.{profile}");
        if dotenv::from_filename(&path).is_ok() {
            info!(path, "Loaded profile dotenv");
        } else {
            info!(path, "Profile dotenv not found");
        }
    }
    let _ = dotenv::dotenv();
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// Parse a ceiling variable. Empty or `0` means unlimited; junk is fatal.
fn parse_ceiling(name: &str) -> Result<Option<u64>> {
    match env_opt(name) {
        None => Ok(None),
        Some(raw) => {
            let raw = raw.trim();
            if raw == "0" {
                return Ok(None);
            }
            let parsed: u64 = raw
                .parse()
                .map_err(|_| Error::Config(format!("{name} must be a positive integer")))?;
            Ok(if parsed > 0 { Some(parsed) } else { None })
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let feeds_raw = env_opt("RSS_FEEDS")
            .ok_or_else(|| Error::Config("RSS_FEEDS is required".to_string()))?;
        let rss_feeds: Vec<String> = feeds_raw
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        if rss_feeds.is_empty() {
            return Err(Error::Config("RSS_FEEDS is required".to_string()));
        }

        let provider = match env_or("LLM_PROVIDER", "openai").to_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            "anthropic" => Provider::Anthropic,
            other => {
                return Err(Error::Config(format!(
                    "LLM_PROVIDER must be 'openai' or 'anthropic', got '{other}'"
                )))
            }
        };

        let openai_api_key = env_opt("OPENAI_API_KEY");
        let anthropic_api_key = env_opt("ANTHROPIC_API_KEY");
        match provider {
            Provider::OpenAi if openai_api_key.is_none() => {
                return Err(Error::Config(
                    "OPENAI_API_KEY is required when using OpenAI".to_string(),
                ))
            }
            Provider::Anthropic if anthropic_api_key.is_none() => {
                return Err(Error::Config(
                    "ANTHROPIC_API_KEY is required when using Anthropic".to_string(),
                ))
            }
            _ => {}
        }

        let cache_ttl_hours: i64 = env_or("CACHE_DURATION_HOURS", "24")
            .parse()
            .map_err(|_| Error::Config("CACHE_DURATION_HOURS must be an integer".to_string()))?;

        let wordpress = match (
            env_opt("WORDPRESS_URL"),
            env_opt("WORDPRESS_USERNAME"),
            env_opt("WORDPRESS_APP_PASSWORD"),
        ) {
            (Some(site_url), Some(username), Some(app_password)) => Some(WordPressConfig {
                site_url,
                username,
                app_password,
            }),
            _ => None,
        };

        let config = Self {
            provider,
            rss_feeds,
            cache_ttl_hours,
            cache_path: env_or("CACHE_PATH", "cache.json"),
            allowlist_path: env_or("ALLOWLIST_PATH", "config/allowlist.txt"),
            draft_path: env_or("DRAFT_PATH", DEFAULT_DRAFT_PATH),
            max_articles_per_run: parse_ceiling("MAX_ARTICLES_PER_RUN")?
                .map(|n| n as usize),
            max_tokens_per_run: parse_ceiling("MAX_TOKENS_PER_RUN")?,
            wordpress,
            category_config_path: env_or("CATEGORY_CONFIG_PATH", "config/category_keywords.json"),
            unsplash_access_key: env_opt("UNSPLASH_ACCESS_KEY"),
            prompts_dir: env_or("PROMPTS_DIR", "prompts"),
            prompt_variant: env_or("PROMPT_VARIANT", "default"),
            openai_api_key,
            openai_model: env_or("OPENAI_MODEL", "gpt-4-turbo-preview"),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            anthropic_api_key,
            anthropic_model: env_or("ANTHROPIC_MODEL", "claude-3-sonnet-20240229"),
        };

        info!(
            provider = %config.provider,
            feeds = config.rss_feeds.len(),
            cache_ttl_hours = config.cache_ttl_hours,
            wordpress_configured = config.wordpress.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }
}
