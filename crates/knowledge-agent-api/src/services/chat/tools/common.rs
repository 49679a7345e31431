use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::document::ContentExtractor;
use crate::graph::DocumentProvider;

use super::AgentTool;

/// Character cap on file content returned to the model.
const MAX_FILE_CONTENT: usize = 8000;
const TRUNCATION_SUFFIX: &str = "\n[Content truncated]";

pub struct GetCurrentSiteTool {
    provider: Arc<dyn DocumentProvider>,
    site_url: Option<String>,
}

impl GetCurrentSiteTool {
    pub fn new(provider: Arc<dyn DocumentProvider>, site_url: Option<String>) -> Self {
        Self { provider, site_url }
    }
}

#[async_trait]
impl AgentTool for GetCurrentSiteTool {
    fn name(&self) -> &'static str {
        "get_current_site"
    }

    fn description(&self) -> &'static str {
        "Resolve the site this conversation is scoped to and return its descriptor."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _arguments: &str) -> Result<String> {
        let site_url = self
            .site_url
            .as_deref()
            .ok_or_else(|| anyhow!("no site is configured for this conversation"))?;
        let site = self.provider.get_site(site_url).await?;
        serde_json::to_string_pretty(&site).context("failed to serialize site descriptor")
    }
}

pub struct GetCurrentUserTool {
    provider: Arc<dyn DocumentProvider>,
    user_token: String,
}

impl GetCurrentUserTool {
    pub fn new(provider: Arc<dyn DocumentProvider>, user_token: String) -> Self {
        Self {
            provider,
            user_token,
        }
    }
}

#[async_trait]
impl AgentTool for GetCurrentUserTool {
    fn name(&self) -> &'static str {
        "get_current_user"
    }

    fn description(&self) -> &'static str {
        "Return the profile of the user you are assisting, fetched with their own credential."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _arguments: &str) -> Result<String> {
        let profile = self.provider.get_user_profile(&self.user_token).await?;
        serde_json::to_string_pretty(&profile).context("failed to serialize user profile")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadFileArgs {
    web_url: String,
}

pub struct ReadFileContentTool {
    extractor: ContentExtractor,
}

impl ReadFileContentTool {
    pub fn new(extractor: ContentExtractor) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl AgentTool for ReadFileContentTool {
    fn name(&self) -> &'static str {
        "read_file_content"
    }

    fn description(&self) -> &'static str {
        "Download a single document by its webUrl and return its extracted text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "webUrl": {
                    "type": "string",
                    "description": "Absolute URL of the document to read"
                }
            },
            "required": ["webUrl"]
        })
    }

    async fn call(&self, arguments: &str) -> Result<String> {
        let args: ReadFileArgs =
            serde_json::from_str(arguments).context("read_file_content expects {\"webUrl\"}")?;
        let text = self.extractor.extract_from_url(&args.web_url).await?;

        if text.is_empty() {
            return Ok("The document contains no extractable text.".to_string());
        }
        Ok(truncate_content(&text))
    }
}

fn truncate_content(text: &str) -> String {
    if text.chars().count() <= MAX_FILE_CONTENT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_FILE_CONTENT).collect();
    truncated.push_str(TRUNCATION_SUFFIX);
    truncated
}
