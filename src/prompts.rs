//! Prompt file lookup with variant fallback.
//!
//! Prompts live on disk as plain text, one file per logical name, grouped by
//! variant: `<root>/<variant>/<variant>_<key>.txt` where the key is the
//! logical name with `/` flattened to `_` (so `summarize/system` becomes
//! `summarize_system`). A missing variant file falls back to the `default`
//! variant; a missing default is an error.

use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PromptStore {
    root: PathBuf,
    variant: String,
}

impl PromptStore {
    pub fn new(root: impl Into<PathBuf>, variant: &str) -> Self {
        let variant = variant.trim().to_lowercase();
        Self {
            root: root.into(),
            variant: if variant.is_empty() {
                "default".to_string()
            } else {
                variant
            },
        }
    }

    /// Load prompt text for a logical name such as `"summarize/system"`.
    pub fn load(&self, name: &str) -> Result<String> {
        let key = name.replace('/', "_");
        let candidate = self
            .root
            .join(&self.variant)
            .join(format!("{}_{key}.txt", self.variant));
        let fallback = self.root.join("default").join(format!("default_{key}.txt"));

        let path = if candidate.exists() {
            candidate
        } else {
            if self.variant != "default" {
                info!(
                    variant = %self.variant,
                    prompt = name,
                    "Prompt variant missing; falling back to default"
                );
            }
            fallback
        };

        std::fs::read_to_string(&path)
            .map_err(|_| Error::Prompt(format!("{name} (variant={})", self.variant)))
    }
}

/// Fill `{placeholder}` slots in a prompt template. Unknown placeholders are
/// left as-is; the caller controls the slot names.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
