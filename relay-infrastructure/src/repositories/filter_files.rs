use anyhow::{Context, Result};
use tokio::fs;

use relay_domain::FilterList;

/// Reads filter lists kept outside the main config file.
pub struct FilterFileRepository;

impl FilterFileRepository {
    pub fn new() -> Self {
        Self
    }

    /// Loads a YAML (or JSON) list of filters from `path`, folding legacy
    /// `message`/`color` keys into format blocks.
    pub async fn load(&self, path: &str) -> Result<FilterList> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read filters from {}", path))?;
        let mut filters: FilterList = if content.trim().is_empty() {
            FilterList::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("invalid filter file {}", path))?
        };
        for filter in filters.iter_mut() {
            filter.normalize_legacy_format();
        }
        Ok(filters)
    }
}

impl Default for FilterFileRepository {
    fn default() -> Self {
        Self::new()
    }
}
