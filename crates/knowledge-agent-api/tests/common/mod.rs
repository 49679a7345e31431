#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use knowledge_agent_api::graph::kql::SearchQuery;
use knowledge_agent_api::graph::models::{
    FileType, KnowledgeDocument, PagePart, ProbeTarget, SearchHit, SiteInfo, UserProfile,
};
use knowledge_agent_api::graph::DocumentProvider;
use knowledge_agent_api::models::chat::ChatMessage;
use knowledge_agent_api::search::models::{
    DocumentChunk, IndexStats, ScoredChunk, SearchOptions, UpsertReport, EMBEDDING_DIMENSION,
};
use knowledge_agent_api::search::VectorIndex;
use knowledge_agent_api::services::llm::{AssistantTurn, ChatModel, ToolDefinition};
use knowledge_agent_api::services::{Embedder, Embedding};

pub fn page_document(id: &str) -> KnowledgeDocument {
    KnowledgeDocument {
        id: id.to_string(),
        title: format!("{id}.aspx"),
        web_url: format!("https://contoso.sharepoint.com/sites/kb/SitePages/{id}.aspx"),
        file_type: FileType::Aspx,
        last_modified: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
        site_url: "https://contoso.sharepoint.com/sites/kb".to_string(),
        site_name: "kb".to_string(),
        drive_id: None,
        drive_item_id: None,
    }
}

/// Provider fake: documents come back from search, their text arrives as a
/// structured page part, and access probes consult a configurable set.
#[derive(Default)]
pub struct FakeProvider {
    pub documents: Mutex<Vec<KnowledgeDocument>>,
    /// page name -> page text
    pub contents: Mutex<HashMap<String, String>>,
    /// page names whose content fetch fails
    pub failing_pages: Mutex<HashSet<String>>,
    /// document ids the requesting user may access
    pub accessible: Mutex<HashSet<String>>,
    /// recorded probe targets, in order
    pub probes: Mutex<Vec<String>>,
    /// artificial latency for the search call
    pub search_delay: Option<Duration>,
}

impl FakeProvider {
    pub fn with_documents(documents: Vec<KnowledgeDocument>) -> Self {
        Self {
            documents: Mutex::new(documents),
            ..Self::default()
        }
    }

    pub fn set_content(&self, page_name: &str, text: &str) {
        self.contents
            .lock()
            .unwrap()
            .insert(page_name.to_string(), text.to_string());
    }

    pub fn fail_page(&self, page_name: &str) {
        self.failing_pages
            .lock()
            .unwrap()
            .insert(page_name.to_string());
    }

    pub fn allow(&self, document_id: &str) {
        self.accessible
            .lock()
            .unwrap()
            .insert(document_id.to_string());
    }

    pub fn probed_ids(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentProvider for FakeProvider {
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<KnowledgeDocument>> {
        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn search_hits(&self, _query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let documents = self.documents.lock().unwrap().clone();
        Ok(documents
            .into_iter()
            .map(|doc| SearchHit {
                name: doc.title.clone(),
                summary: format!("Summary of {}", doc.title),
                web_url: doc.web_url,
                drive_id: doc.drive_id,
                item_id: doc.drive_item_id,
                last_modified: Some(doc.last_modified),
            })
            .collect())
    }

    async fn download_bytes(&self, document: &KnowledgeDocument) -> Result<Bytes> {
        bail!("no binary content for {}", document.id)
    }

    async fn download_by_url(&self, web_url: &str) -> Result<Bytes> {
        bail!("no raw content at {web_url}")
    }

    async fn resolve_site(&self, _hostname: &str, _site_name: &str) -> Result<String> {
        Ok("site-1".to_string())
    }

    async fn get_page_content(&self, _site_id: &str, page_name: &str) -> Result<Vec<PagePart>> {
        if self.failing_pages.lock().unwrap().contains(page_name) {
            bail!("page endpoint returned 500");
        }
        let contents = self.contents.lock().unwrap();
        match contents.get(page_name) {
            Some(text) => Ok(vec![PagePart {
                inner_html: None,
                text: Some(text.clone()),
            }]),
            None => Ok(vec![]),
        }
    }

    async fn probe_access(&self, target: &ProbeTarget, _user_token: &str) -> bool {
        self.probes
            .lock()
            .unwrap()
            .push(target.document_id.clone());
        self.accessible
            .lock()
            .unwrap()
            .contains(&target.document_id)
    }

    async fn get_user_profile(&self, _user_token: &str) -> Result<UserProfile> {
        Ok(UserProfile {
            display_name: "Test User".to_string(),
            mail: "test@contoso.com".to_string(),
            job_title: None,
            department: None,
            company_name: None,
            office_location: None,
            manager: None,
        })
    }

    async fn get_site(&self, site_url: &str) -> Result<SiteInfo> {
        Ok(SiteInfo {
            id: "site-1".to_string(),
            name: "kb".to_string(),
            web_url: site_url.to_string(),
        })
    }
}

/// Deterministic embedder recording the size of every batch it receives.
#[derive(Default)]
pub struct FakeEmbedder {
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl FakeEmbedder {
    pub fn batches(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let seed = (text.len() % 13) as f32;
        let mut vector = vec![0.01; EMBEDDING_DIMENSION];
        vector[0] = seed / 13.0;
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(texts
            .iter()
            .map(|text| Embedding {
                vector: Self::vector_for(text),
                token_count: text.len().div_ceil(4),
            })
            .collect())
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(Embedding {
            vector: Self::vector_for(text),
            token_count: text.len().div_ceil(4),
        })
    }
}

/// In-memory stand-in for the remote vector index. Ranking is positional:
/// chunks come back ordered by id with slowly decreasing scores.
#[derive(Default)]
pub struct InMemoryIndex {
    pub chunks: Mutex<HashMap<String, DocumentChunk>>,
}

impl InMemoryIndex {
    pub fn chunk_count_for(&self, document_id: &str) -> usize {
        self.chunks
            .lock()
            .unwrap()
            .values()
            .filter(|chunk| chunk.document_id == document_id)
            .count()
    }

    pub fn chunks_for(&self, document_id: &str) -> Vec<DocumentChunk> {
        let mut chunks: Vec<DocumentChunk> = self
            .chunks
            .lock()
            .unwrap()
            .values()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        chunks
    }

    pub fn insert(&self, chunk: DocumentChunk) {
        self.chunks
            .lock()
            .unwrap()
            .insert(chunk.id.clone(), chunk);
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: &[DocumentChunk]) -> Result<UpsertReport> {
        for chunk in chunks {
            if chunk.embedding.len() != EMBEDDING_DIMENSION {
                bail!("embedding length {} is invalid", chunk.embedding.len());
            }
        }
        let mut store = self.chunks.lock().unwrap();
        for chunk in chunks {
            store.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(UpsertReport {
            succeeded: chunks.len(),
            failed: 0,
        })
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<usize> {
        let mut store = self.chunks.lock().unwrap();
        let before = store.len();
        store.retain(|_, chunk| chunk.document_id != document_id);
        Ok(before - store.len())
    }

    async fn search_similar(
        &self,
        _embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>> {
        let store = self.chunks.lock().unwrap();
        let mut entries: Vec<&DocumentChunk> = store.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        let hits: Vec<ScoredChunk> = entries
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| ScoredChunk {
                score: 0.95 - position as f32 * 0.01,
                id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                drive_id: chunk.drive_id.clone(),
                web_url: chunk.web_url.clone(),
                site_url: chunk.site_url.clone(),
                site_name: chunk.site_name.clone(),
                document_title: chunk.document_title.clone(),
                file_type: chunk.file_type.clone(),
                chunk_index: chunk.chunk_index,
                chunk_text: chunk.chunk_text.clone(),
            })
            .filter(|hit| hit.score >= options.min_score)
            .take(options.top_k)
            .collect();
        Ok(hits)
    }

    async fn search_hybrid(
        &self,
        _query: &str,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>> {
        self.search_similar(embedding, options).await
    }

    async fn get_stats(&self) -> Result<IndexStats> {
        let store = self.chunks.lock().unwrap();
        Ok(IndexStats {
            document_count: store.len() as u64,
            storage_size: 0,
        })
    }
}

/// Scripted chat model: pops one prepared turn per call and records every
/// transcript it was shown.
pub struct ScriptedModel {
    script: Mutex<Vec<AssistantTurn>>,
    pub transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<AssistantTurn>) -> Self {
        let mut script = turns;
        script.reverse();
        Self {
            script: Mutex::new(script),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    pub fn transcript(&self, call: usize) -> Vec<ChatMessage> {
        self.transcripts.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<AssistantTurn> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        match self.script.lock().unwrap().pop() {
            Some(turn) => Ok(turn),
            None => bail!("scripted model ran out of turns"),
        }
    }
}

pub fn stored_chunk(document_id: &str, index: i32, text: &str) -> DocumentChunk {
    DocumentChunk {
        id: format!("{document_id}_chunk_{index}"),
        document_id: document_id.to_string(),
        drive_id: Some("drive-1".to_string()),
        web_url: format!("https://contoso.sharepoint.com/sites/kb/{document_id}.pdf"),
        site_url: "https://contoso.sharepoint.com/sites/kb".to_string(),
        site_name: "kb".to_string(),
        document_title: format!("{document_id}.pdf"),
        file_type: "pdf".to_string(),
        chunk_index: index,
        chunk_text: text.to_string(),
        embedding: vec![0.01; EMBEDDING_DIMENSION],
        document_modified_at: Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap(),
        indexed_at: Utc.with_ymd_and_hms(2024, 1, 11, 9, 0, 0).unwrap(),
    }
}
