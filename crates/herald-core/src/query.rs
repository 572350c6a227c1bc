use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One result returned by an external query source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Canonical URL of the entry (e.g. `http://arxiv.org/abs/2401.00001v1`).
    pub entry_id: String,
    pub title: String,
    pub published: DateTime<Utc>,
}

impl SearchResult {
    /// Markdown bullet linking the entry.
    pub fn to_markdown_line(&self) -> String {
        format!("- [{}]({})", self.title, self.entry_id)
    }
}
