use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::auth::CurrentUser;
use crate::config::{ChatConfig, GraphConfig, RetrievalConfig};
use crate::document::ContentExtractor;
use crate::graph::DocumentProvider;
use crate::models::chat::{ChatMessage, ChatRequest, ChatResponse, SearchMode};
use crate::search::models::SearchOptions;
use crate::search::VectorIndex;
use crate::services::embedding::Embedder;
use crate::services::llm::ChatModel;
use crate::utils::error::ApiError;

use super::agent::ChatAgent;
use super::permission::PermissionFilter;
use super::prompt::build_system_prompt;
use super::tools::{
    GetCurrentSiteTool, GetCurrentUserTool, KnowledgeSearchTool, ReadFileContentTool,
    SharepointSearchTool, ToolRegistry,
};

/// Per-request orchestration of the chat core: mode resolution, tool
/// wiring, the agent loop, and the response envelope.
pub struct ChatService {
    model: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn DocumentProvider>,
    extractor: ContentExtractor,
    retrieval: RetrievalConfig,
    default_mode: SearchMode,
    default_site_url: Option<String>,
}

impl ChatService {
    pub fn new(
        model: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn DocumentProvider>,
        extractor: ContentExtractor,
        retrieval: RetrievalConfig,
        chat: &ChatConfig,
        graph: &GraphConfig,
    ) -> Self {
        Self {
            model,
            embedder,
            index,
            provider,
            extractor,
            retrieval,
            default_mode: chat.default_search_mode,
            default_site_url: graph.default_site_url.clone(),
        }
    }

    pub async fn handle(
        &self,
        user: &CurrentUser,
        request: ChatRequest,
    ) -> Result<ChatResponse, ApiError> {
        let Some(last) = request.messages.last() else {
            return Err(ApiError::BadRequest("messages cannot be empty".to_string()));
        };
        if last.role != "user" || last.content.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "the last message must be a non-empty user message".to_string(),
            ));
        }

        let mode = request.context.search_mode.unwrap_or(self.default_mode);
        let site_url = request
            .context
            .site_url
            .clone()
            .or_else(|| self.default_site_url.clone());

        info!(user = %user.id, %mode, "chat turn");

        let registry = self.build_registry(user, mode, site_url);

        let mut transcript = Vec::with_capacity(request.messages.len() + 1);
        transcript.push(ChatMessage::system(build_system_prompt(
            user,
            mode,
            Utc::now(),
        )));
        transcript.extend(request.messages.iter().cloned());

        let agent = ChatAgent::new(self.model.as_ref(), &registry);
        let answer = agent
            .run(transcript)
            .await
            .map_err(|err| ApiError::LlmError(format!("{err:#}")))?;

        let mut messages = request.messages;
        messages.push(ChatMessage::assistant(answer.clone()));

        Ok(ChatResponse {
            response: answer,
            messages,
            search_mode: mode,
        })
    }

    fn build_registry(
        &self,
        user: &CurrentUser,
        mode: SearchMode,
        site_url: Option<String>,
    ) -> ToolRegistry {
        let mut registry = ToolRegistry::new();

        registry.register(Box::new(GetCurrentSiteTool::new(
            self.provider.clone(),
            site_url.clone(),
        )));
        registry.register(Box::new(GetCurrentUserTool::new(
            self.provider.clone(),
            user.bearer_token.clone(),
        )));
        registry.register(Box::new(ReadFileContentTool::new(self.extractor.clone())));

        match mode {
            SearchMode::Rag => {
                let permissions = Arc::new(PermissionFilter::new(
                    self.provider.clone(),
                    user.bearer_token.clone(),
                ));
                let options = SearchOptions {
                    top_k: self.retrieval.top_k,
                    min_score: self.retrieval.min_score,
                    site_url,
                    file_types: None,
                };
                registry.register(Box::new(KnowledgeSearchTool::new(
                    self.embedder.clone(),
                    self.index.clone(),
                    permissions,
                    options,
                    self.retrieval.hybrid,
                )));
            }
            SearchMode::Kql => {
                registry.register(Box::new(SharepointSearchTool::new(
                    self.provider.clone(),
                    site_url,
                )));
            }
        }

        registry
    }
}
