pub mod common;
pub mod keyword;
pub mod knowledge;

pub use common::{GetCurrentSiteTool, GetCurrentUserTool, ReadFileContentTool};
pub use keyword::SharepointSearchTool;
pub use knowledge::KnowledgeSearchTool;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::services::llm::ToolDefinition;

/// A string-in / string-out transaction the model can invoke. Tool errors
/// become tool-result strings so the model can recover, never request
/// failures.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn call(&self, arguments: &str) -> Result<String>;
}

/// The tool set for one request. Built per request so per-request state
/// (permission cache, site scope) lives inside the tool instances; there is
/// no process-wide tool list.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn AgentTool>) {
        self.tools.push(tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn dispatch(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            warn!(tool = name, "model requested unknown tool");
            return format!("Error: unknown tool '{name}'");
        };

        match tool.call(arguments).await {
            Ok(output) => output,
            Err(err) => {
                warn!(tool = name, error = %format!("{err:#}"), "tool call failed");
                format!("Error: {err:#}")
            }
        }
    }
}
