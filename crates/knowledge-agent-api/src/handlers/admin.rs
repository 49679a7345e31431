use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::graph::models::KnowledgeDocument;
use crate::search::models::IndexStats;
use crate::services::indexer::{IndexerOptions, RunOutcome};
use crate::state::AppState;
use crate::utils::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerParams {
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default)]
    pub days: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn build_options(state: &AppState, params: IndexerParams, skip_embeddings: bool) -> IndexerOptions {
    IndexerOptions {
        site_url: params
            .site_url
            .or_else(|| state.settings.graph.default_site_url.clone()),
        days_back: params.days.unwrap_or(state.settings.indexer.days_back),
        skip_embeddings,
        limit: params.limit,
    }
}

async fn trigger(
    state: Arc<AppState>,
    params: IndexerParams,
    skip_embeddings: bool,
) -> Result<Json<Value>, ApiError> {
    let options = build_options(&state, params, skip_embeddings);
    info!(?options, "manual indexer trigger");

    match state.pipeline.run(options).await {
        Ok(RunOutcome::Completed(result)) => {
            Ok(Json(json!({ "status": "completed", "result": result })))
        }
        Ok(RunOutcome::AlreadyRunning) => Ok(Json(json!({ "status": "already_running" }))),
        Err(err) => Err(ApiError::InternalError(format!("{err:#}"))),
    }
}

/// Run a full indexing pass.
/// POST /api/admin/knowledge-indexer/run
pub async fn run_indexer(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexerParams>,
) -> Result<Json<Value>, ApiError> {
    trigger(state, params, false).await
}

/// Run a pass that counts chunks without embedding or storing.
/// POST /api/admin/knowledge-indexer/test
pub async fn test_indexer(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexerParams>,
) -> Result<Json<Value>, ApiError> {
    trigger(state, params, true).await
}

/// List the documents a pass would consider.
/// GET /api/admin/knowledge-indexer/preview
pub async fn preview_indexer(
    State(state): State<Arc<AppState>>,
    Query(params): Query<IndexerParams>,
) -> Result<Json<Vec<KnowledgeDocument>>, ApiError> {
    let options = build_options(&state, params, true);
    let documents = state
        .pipeline
        .preview(&options)
        .await
        .map_err(|err| ApiError::ProviderError(format!("{err:#}")))?;
    Ok(Json(documents))
}

/// Vector index statistics.
/// GET /api/admin/knowledge-indexer/stats
pub async fn indexer_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IndexStats>, ApiError> {
    let stats = state
        .index
        .get_stats()
        .await
        .map_err(|err| ApiError::SearchIndexError(format!("{err:#}")))?;
    Ok(Json(stats))
}
