use std::sync::Arc;

use crate::config::Settings;
use crate::document::ContentExtractor;
use crate::graph::DocumentProvider;
use crate::search::VectorIndex;
use crate::services::{ChatService, Embedder, IndexingPipeline};

/// Application state shared across handlers. External-service clients are
/// threaded in explicitly; the only mutable pieces live inside them (token
/// caches) and inside the pipeline's running flag.
pub struct AppState {
    pub settings: Settings,
    pub provider: Arc<dyn DocumentProvider>,
    pub extractor: ContentExtractor,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub pipeline: Arc<IndexingPipeline>,
    pub chat: ChatService,
}
