use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::document::{chunk_text, ChunkOptions, ContentExtractor, MIN_CONTENT_LEN};
use crate::graph::models::{FileType, KnowledgeDocument};
use crate::graph::{DocumentProvider, SearchQuery};
use crate::search::models::DocumentChunk;
use crate::search::VectorIndex;
use crate::services::Embedder;

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub site_url: Option<String>,
    pub days_back: i64,
    /// Count chunks without embedding or storing them (test mode).
    pub skip_embeddings: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerResult {
    pub documents_found: usize,
    pub documents_processed: usize,
    pub documents_skipped: usize,
    pub chunks_created: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(IndexerResult),
    /// A pass was already in flight; the trigger was dropped, not queued.
    AlreadyRunning,
}

/// Orchestrates discovery, extraction, chunking, embedding and the
/// delete-then-upsert replace per document. One pass at a time per process.
pub struct IndexingPipeline {
    provider: Arc<dyn DocumentProvider>,
    extractor: ContentExtractor,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunk_options: ChunkOptions,
    running: AtomicBool,
}

impl IndexingPipeline {
    pub fn new(
        provider: Arc<dyn DocumentProvider>,
        extractor: ContentExtractor,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunk_options: ChunkOptions,
    ) -> Self {
        Self {
            provider,
            extractor,
            embedder,
            index,
            chunk_options,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(&self, options: IndexerOptions) -> Result<RunOutcome> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("indexing pass already running, dropping trigger");
            return Ok(RunOutcome::AlreadyRunning);
        }

        let result = self.run_pass(options).await;
        self.running.store(false, Ordering::SeqCst);
        result.map(RunOutcome::Completed)
    }

    /// Discovery only, for the admin preview endpoint.
    pub async fn preview(&self, options: &IndexerOptions) -> Result<Vec<KnowledgeDocument>> {
        let mut documents = self.provider.search(&Self::discovery_query(options)).await?;
        if let Some(limit) = options.limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    async fn run_pass(&self, options: IndexerOptions) -> Result<IndexerResult> {
        let started = Instant::now();
        info!(
            site_url = options.site_url.as_deref().unwrap_or("<all>"),
            days_back = options.days_back,
            skip_embeddings = options.skip_embeddings,
            "starting indexing pass"
        );

        let documents = self
            .provider
            .search(&Self::discovery_query(&options))
            .await
            .context("document discovery failed")?;

        let mut result = IndexerResult {
            documents_found: documents.len(),
            ..IndexerResult::default()
        };

        let limit = options.limit.unwrap_or(documents.len());
        for document in documents.into_iter().take(limit) {
            match self.process_document(&document, options.skip_embeddings).await {
                Ok(Some(chunk_count)) => {
                    result.documents_processed += 1;
                    result.chunks_created += chunk_count;
                }
                Ok(None) => result.documents_skipped += 1,
                Err(err) => {
                    warn!(
                        document = %document.title,
                        error = %format!("{err:#}"),
                        "document indexing failed"
                    );
                    result
                        .errors
                        .push(format!("{} ({}): {err:#}", document.title, document.id));
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            found = result.documents_found,
            processed = result.documents_processed,
            skipped = result.documents_skipped,
            chunks = result.chunks_created,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "indexing pass finished"
        );
        Ok(result)
    }

    async fn process_document(
        &self,
        document: &KnowledgeDocument,
        skip_embeddings: bool,
    ) -> Result<Option<usize>> {
        let text = self.extractor.extract(document).await?;
        if text.chars().count() < MIN_CONTENT_LEN {
            debug!(document = %document.title, "skipping: insufficient content");
            return Ok(None);
        }

        let chunks = chunk_text(&text, &self.chunk_options);
        if chunks.is_empty() {
            debug!(document = %document.title, "skipping: no chunks produced");
            return Ok(None);
        }

        if skip_embeddings {
            return Ok(Some(chunks.len()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let indexed_at = Utc::now();
        let stored: Vec<DocumentChunk> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| DocumentChunk {
                id: DocumentChunk::chunk_key(&document.id, chunk.index),
                document_id: document.id.clone(),
                drive_id: document.drive_id.clone(),
                web_url: document.web_url.clone(),
                site_url: document.site_url.clone(),
                site_name: document.site_name.clone(),
                document_title: document.title.clone(),
                file_type: document.file_type.as_str().to_string(),
                chunk_index: chunk.index as i32,
                chunk_text: chunk.text.clone(),
                embedding: embedding.vector,
                document_modified_at: document.last_modified,
                indexed_at,
            })
            .collect();

        // Strict replace: stale chunks go first so no orphans survive.
        self.index
            .delete_by_document_id(&document.id)
            .await
            .context("failed to delete stale chunks")?;
        let report = self
            .index
            .upsert_chunks(&stored)
            .await
            .context("failed to upsert chunks")?;

        Ok(Some(report.succeeded))
    }

    fn discovery_query(options: &IndexerOptions) -> SearchQuery {
        let mut query = SearchQuery::new()
            .index_marker()
            .file_types(&FileType::INDEXABLE)
            .modified_within(options.days_back, Utc::now());
        if let Some(site_url) = &options.site_url {
            query = query.path(site_url);
        }
        query
    }
}
