use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::graph::models::ProbeTarget;
use crate::search::models::{ScoredChunk, SearchOptions};
use crate::search::VectorIndex;
use crate::services::chat::permission::PermissionFilter;
use crate::services::embedding::Embedder;

use super::AgentTool;

#[derive(Debug, Deserialize)]
struct KnowledgeSearchArgs {
    query: String,
}

/// Vector retrieval with the mandatory per-chunk permission filter. Chunks
/// whose documents fail the probe never reach the model; they are dropped
/// before the tool result string is built.
pub struct KnowledgeSearchTool {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    permissions: Arc<PermissionFilter>,
    options: SearchOptions,
    hybrid: bool,
}

impl KnowledgeSearchTool {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        permissions: Arc<PermissionFilter>,
        options: SearchOptions,
        hybrid: bool,
    ) -> Self {
        Self {
            embedder,
            index,
            permissions,
            options,
            hybrid,
        }
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;

        // Over-fetch so the permission filter still leaves enough sources.
        let mut fetch_options = self.options.clone();
        fetch_options.top_k = self.options.top_k * 2;

        let hits = if self.hybrid {
            self.index
                .search_hybrid(query, &embedding.vector, &fetch_options)
                .await?
        } else {
            self.index
                .search_similar(&embedding.vector, &fetch_options)
                .await?
        };

        // One probe per unique document, memoized for the request.
        let mut seen = HashSet::new();
        let mut allowed_ids = HashSet::new();
        for hit in &hits {
            if !seen.insert(hit.document_id.clone()) {
                continue;
            }
            let target = ProbeTarget {
                document_id: hit.document_id.clone(),
                drive_id: hit.drive_id.clone(),
                web_url: hit.web_url.clone(),
            };
            if self.permissions.is_accessible(&target).await {
                allowed_ids.insert(hit.document_id.clone());
            }
        }

        let filtered = hits.len();
        let mut best: HashMap<String, ScoredChunk> = HashMap::new();
        for hit in hits {
            if !allowed_ids.contains(&hit.document_id) {
                continue;
            }
            match best.get(&hit.document_id) {
                Some(existing) if existing.score >= hit.score => {}
                _ => {
                    best.insert(hit.document_id.clone(), hit);
                }
            }
        }

        let mut sources: Vec<ScoredChunk> = best.into_values().collect();
        sources.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sources.truncate(self.options.top_k);

        debug!(
            candidates = filtered,
            accessible_documents = allowed_ids.len(),
            returned = sources.len(),
            "knowledge search retrieval"
        );
        Ok(sources)
    }
}

fn format_sources(sources: &[ScoredChunk]) -> String {
    let mut output = format!("Found {} relevant sources:\n", sources.len());
    for (position, source) in sources.iter().enumerate() {
        let _ = write!(output, "\n[Source {}]\n", position + 1);
        let _ = writeln!(output, "Title: {}", source.document_title);
        let _ = writeln!(output, "URL: {}", source.web_url);
        let _ = writeln!(output, "Site: {}", source.site_name);
        if let Some(drive_id) = &source.drive_id {
            let _ = writeln!(output, "DriveId: {drive_id}");
        }
        let _ = writeln!(output, "ItemId: {}", source.document_id);
        let _ = writeln!(output, "Relevance: {}%", (source.score * 100.0).round() as i32);
        let _ = writeln!(output, "Content:\n{}", source.chunk_text);
    }
    output
}

#[async_trait]
impl AgentTool for KnowledgeSearchTool {
    fn name(&self) -> &'static str {
        "knowledge_search"
    }

    fn description(&self) -> &'static str {
        "Semantic search over the indexed knowledge base. Returns the most relevant accessible sources."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The user's question, verbatim"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, arguments: &str) -> Result<String> {
        let args: KnowledgeSearchArgs =
            serde_json::from_str(arguments).context("knowledge_search expects {\"query\"}")?;

        let sources = self.retrieve(&args.query).await?;
        if sources.is_empty() {
            return Ok(
                "No relevant sources were found in the knowledge base for this query."
                    .to_string(),
            );
        }
        Ok(format_sources(&sources))
    }
}
