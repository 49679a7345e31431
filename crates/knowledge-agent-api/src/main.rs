use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use knowledge_agent_api::auth;
use knowledge_agent_api::config::Settings;
use knowledge_agent_api::document::{ChunkOptions, ContentExtractor};
use knowledge_agent_api::graph::{DocumentProvider, GraphClient};
use knowledge_agent_api::handlers;
use knowledge_agent_api::search::{AzureSearchClient, VectorIndex};
use knowledge_agent_api::services::{
    AzureChatClient, AzureEmbeddingClient, ChatService, Embedder, IndexerScheduler,
    IndexingPipeline,
};
use knowledge_agent_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,knowledge_agent_api=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("starting knowledge agent api");

    let settings = Settings::load()?;
    info!("configuration loaded");

    // External-service clients
    let provider: Arc<dyn DocumentProvider> =
        Arc::new(GraphClient::new(settings.graph.clone()));
    let embedder: Arc<dyn Embedder> =
        Arc::new(AzureEmbeddingClient::new(settings.openai.clone()));
    let index: Arc<dyn VectorIndex> =
        Arc::new(AzureSearchClient::new(settings.search.clone()));
    let model = Arc::new(AzureChatClient::new(settings.openai.clone()));

    index
        .ensure_index()
        .await
        .context("vector index bootstrap failed")?;
    info!("vector index ready");

    let extractor = ContentExtractor::new(provider.clone());

    let pipeline = Arc::new(IndexingPipeline::new(
        provider.clone(),
        extractor.clone(),
        embedder.clone(),
        index.clone(),
        ChunkOptions::default(),
    ));

    let chat = ChatService::new(
        model,
        embedder.clone(),
        index.clone(),
        provider.clone(),
        extractor.clone(),
        settings.retrieval.clone(),
        &settings.chat,
        &settings.graph,
    );

    let scheduler = if settings.indexer.enabled {
        Some(IndexerScheduler::spawn(
            pipeline.clone(),
            settings.indexer.clone(),
            settings.graph.default_site_url.clone(),
        ))
    } else {
        info!("knowledge indexer disabled by configuration");
        None
    };

    let port = settings.server.port;
    let state = Arc::new(AppState {
        settings,
        provider,
        extractor,
        embedder,
        index,
        pipeline,
        chat,
    });

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new().route("/health", get(handlers::health::health_check));

    let protected = Router::new()
        .route("/api/chat", post(handlers::chat::chat_handler))
        .route("/api/me", get(handlers::me::me_handler))
        .route(
            "/api/admin/knowledge-indexer/run",
            post(handlers::admin::run_indexer),
        )
        .route(
            "/api/admin/knowledge-indexer/test",
            post(handlers::admin::test_indexer),
        )
        .route(
            "/api/admin/knowledge-indexer/preview",
            get(handlers::admin::preview_indexer),
        )
        .route(
            "/api/admin/knowledge-indexer/stats",
            get(handlers::admin::indexer_stats),
        )
        .layer(middleware::from_fn(auth::require_user))
        .with_state(state);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CatchPanicLayer::new())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
