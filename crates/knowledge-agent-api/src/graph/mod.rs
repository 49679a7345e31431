pub mod client;
pub mod kql;
pub mod models;

pub use client::GraphClient;
pub use kql::SearchQuery;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use models::{KnowledgeDocument, PagePart, ProbeTarget, SearchHit, SiteInfo, UserProfile};

/// Boundary to the hosted document platform. The pipeline and the chat
/// tools only ever talk to this trait so tests can swap in fakes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// Run a keyword search and map hits into indexing candidates.
    /// Malformed hits are skipped, never an error.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<KnowledgeDocument>>;

    /// Same search surface, but keeping per-hit summaries for the chat
    /// keyword tool.
    async fn search_hits(&self, query: &SearchQuery) -> Result<Vec<SearchHit>>;

    /// Fetch a document's raw bytes, by drive identifiers when the hit
    /// carried them, otherwise by hostname + url path.
    async fn download_bytes(&self, document: &KnowledgeDocument) -> Result<Bytes>;

    /// Fetch raw bytes for an absolute web URL.
    async fn download_by_url(&self, web_url: &str) -> Result<Bytes>;

    async fn resolve_site(&self, hostname: &str, site_name: &str) -> Result<String>;

    async fn get_page_content(&self, site_id: &str, page_name: &str) -> Result<Vec<PagePart>>;

    /// Re-verify access with the user's delegated credential. Fail-closed:
    /// only a clean success counts as accessible.
    async fn probe_access(&self, target: &ProbeTarget, user_token: &str) -> bool;

    async fn get_user_profile(&self, user_token: &str) -> Result<UserProfile>;

    async fn get_site(&self, site_url: &str) -> Result<SiteInfo>;
}
