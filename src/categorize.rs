//! Keyword-based category and tag assignment for published posts.
//!
//! An operator-maintained JSON table maps CMS category IDs and tag names to
//! keyword lists. Matching is plain case-insensitive substring search over
//! the article title and content; when no category matches, the table's
//! default category (if any) is used. A missing or unparsable table simply
//! disables auto-assignment.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
struct KeywordTable {
    #[serde(default)]
    default_category_id: Option<u64>,
    /// Category ID (as a JSON object key, hence a string) to keywords.
    #[serde(default)]
    category_keywords: HashMap<String, Vec<String>>,
    /// Tag name to keywords.
    #[serde(default)]
    tag_keywords: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct Categorizer {
    table: KeywordTable,
}

impl Categorizer {
    /// Load the keyword table; missing or corrupt files yield an empty
    /// categorizer rather than an error.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let table = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<KeywordTable>(&raw) {
                Ok(table) => table,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Keyword table unparsable; auto-assignment disabled");
                    KeywordTable::default()
                }
            },
            Err(_) => {
                warn!(path = %path.display(), "Keyword table not found; auto-assignment disabled");
                KeywordTable::default()
            }
        };
        Self { table }
    }

    /// Returns `(category_ids, tag_names)` for the given article, sorted for
    /// deterministic output.
    pub fn categorize(&self, title: &str, content: &str) -> (Vec<u64>, Vec<String>) {
        let text = format!("{title} {content}").to_lowercase();

        let mut categories: Vec<u64> = self
            .table
            .category_keywords
            .iter()
            .filter(|(_, keywords)| matches_any(&text, keywords))
            .filter_map(|(id, _)| {
                id.parse::<u64>()
                    .map_err(|_| warn!(category_id = %id, "Invalid category ID in keyword table"))
                    .ok()
            })
            .collect();
        categories.sort_unstable();

        if categories.is_empty() {
            if let Some(default_id) = self.table.default_category_id {
                categories.push(default_id);
            }
        }

        let mut tags: Vec<String> = self
            .table
            .tag_keywords
            .iter()
            .filter(|(_, keywords)| matches_any(&text, keywords))
            .map(|(name, _)| name.clone())
            .collect();
        tags.sort_unstable();

        info!(?categories, ?tags, "Categorized article");
        (categories, tags)
    }
}

fn matches_any(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}
