use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::graph::models::FileType;
use crate::graph::{DocumentProvider, SearchQuery};

use super::AgentTool;

const KEYWORD_RESULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
struct SharepointSearchArgs {
    query: String,
}

/// Keyword retrieval against the document platform, scoped to the
/// conversation's site when one is configured.
pub struct SharepointSearchTool {
    provider: Arc<dyn DocumentProvider>,
    site_url: Option<String>,
}

impl SharepointSearchTool {
    pub fn new(provider: Arc<dyn DocumentProvider>, site_url: Option<String>) -> Self {
        Self { provider, site_url }
    }
}

#[async_trait]
impl AgentTool for SharepointSearchTool {
    fn name(&self) -> &'static str {
        "sharepoint_search"
    }

    fn description(&self) -> &'static str {
        "Keyword search over documents and pages. Pass 1-3 topic keywords."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "One to three topic keywords"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, arguments: &str) -> Result<String> {
        let args: SharepointSearchArgs =
            serde_json::from_str(arguments).context("sharepoint_search expects {\"query\"}")?;

        let mut query = SearchQuery::new()
            .keywords(&args.query)
            .file_types(&FileType::INDEXABLE)
            .with_size(KEYWORD_RESULT_LIMIT);
        if let Some(site_url) = &self.site_url {
            query = query.site(site_url);
        }

        let hits = self.provider.search_hits(&query).await?;
        if hits.is_empty() {
            return Ok("No results were found for these keywords.".to_string());
        }
        serde_json::to_string_pretty(&hits).context("failed to serialize search hits")
    }
}
