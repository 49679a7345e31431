use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed embedding width; every stored vector must have exactly this many
/// components.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Persisted unit in the vector index. All chunks of one document share its
/// metadata; replacing a document removes every prior chunk first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    pub web_url: String,
    pub site_url: String,
    pub site_name: String,
    pub document_title: String,
    pub file_type: String,
    pub chunk_index: i32,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub document_modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
}

impl DocumentChunk {
    /// URL-safe key: `<sanitized documentId>_chunk_<index>`.
    pub fn chunk_key(document_id: &str, index: usize) -> String {
        format!("{}_chunk_{}", sanitize_key(document_id), index)
    }
}

/// Index keys allow letters, digits, underscore, dash and equal sign;
/// anything else becomes an underscore.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A retrieved chunk with its ranking score in `[0, 1]`, larger is better.
/// The embedding is never selected back out of the index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredChunk {
    #[serde(rename = "@search.score")]
    pub score: f32,
    pub id: String,
    pub document_id: String,
    #[serde(default)]
    pub drive_id: Option<String>,
    pub web_url: String,
    pub site_url: String,
    pub site_name: String,
    pub document_title: String,
    pub file_type: String,
    pub chunk_index: i32,
    pub chunk_text: String,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub site_url: Option<String>,
    pub file_types: Option<Vec<String>>,
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            site_url: None,
            file_types: None,
            min_score: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UpsertReport {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub document_count: u64,
    pub storage_size: u64,
}
