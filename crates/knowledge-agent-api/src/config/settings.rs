use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use tracing::warn;

use crate::models::chat::SearchMode;

/// Flat environment keys as they arrive from the deployment. Grouped into
/// `Settings` after deserialization.
#[derive(Debug, Deserialize)]
struct RawSettings {
    ad_tenant_id: String,
    ad_client_id: String,
    ad_client_secret: String,

    azure_openai_endpoint: String,
    azure_openai_api_key: String,
    #[serde(default = "default_api_version")]
    azure_openai_api_version: String,
    azure_openai_deployment: String,
    azure_openai_embedding_deployment: String,

    azure_search_endpoint: String,
    azure_search_admin_key: String,
    #[serde(default = "default_index_name")]
    azure_search_index_name: String,

    #[serde(default = "default_true")]
    knowledge_indexer_enabled: bool,
    #[serde(default = "default_interval_ms")]
    knowledge_indexer_interval_ms: u64,
    #[serde(default = "default_days_back")]
    knowledge_indexer_days_back: i64,

    #[serde(default = "default_top_k")]
    knowledge_search_top_k: usize,
    #[serde(default = "default_min_score")]
    knowledge_search_min_score: f32,
    #[serde(default)]
    knowledge_hybrid_search: bool,
    #[serde(default)]
    knowledge_site_url: Option<String>,

    #[serde(default = "default_geo")]
    sharepoint_geo: String,
    #[serde(default = "default_search_mode")]
    default_search_mode: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_true() -> bool {
    true
}
fn default_interval_ms() -> u64 {
    3_600_000
}
fn default_days_back() -> i64 {
    30
}
fn default_top_k() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.6
}
fn default_geo() -> String {
    "US".to_string()
}
fn default_search_mode() -> String {
    "kql".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_api_version() -> String {
    "2024-02-01".to_string()
}
fn default_index_name() -> String {
    "knowledge-index".to_string()
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub graph: GraphConfig,
    pub openai: OpenAiConfig,
    pub search: SearchConfig,
    pub indexer: IndexerConfig,
    pub retrieval: RetrievalConfig,
    pub chat: ChatConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub geo: String,
    pub default_site_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub admin_key: String,
    pub index_name: String,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub days_back: i64,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub hybrid: bool,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub default_search_mode: SearchMode,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Settings {
    /// Load from process environment (after `.env`, if present). Missing
    /// required keys fail startup.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()
            .context("failed to read environment configuration")?;

        let raw: RawSettings = config
            .try_deserialize()
            .context("missing or invalid configuration")?;

        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawSettings) -> Self {
        let default_search_mode = match raw.default_search_mode.parse::<SearchMode>() {
            Ok(mode) => mode,
            Err(_) => {
                warn!(
                    value = %raw.default_search_mode,
                    "unrecognized DEFAULT_SEARCH_MODE, falling back to kql"
                );
                SearchMode::Kql
            }
        };

        Self {
            graph: GraphConfig {
                tenant_id: raw.ad_tenant_id,
                client_id: raw.ad_client_id,
                client_secret: raw.ad_client_secret,
                geo: raw.sharepoint_geo,
                default_site_url: raw.knowledge_site_url,
            },
            openai: OpenAiConfig {
                endpoint: raw.azure_openai_endpoint.trim_end_matches('/').to_string(),
                api_key: raw.azure_openai_api_key,
                api_version: raw.azure_openai_api_version,
                chat_deployment: raw.azure_openai_deployment,
                embedding_deployment: raw.azure_openai_embedding_deployment,
            },
            search: SearchConfig {
                endpoint: raw.azure_search_endpoint.trim_end_matches('/').to_string(),
                admin_key: raw.azure_search_admin_key,
                index_name: raw.azure_search_index_name,
            },
            indexer: IndexerConfig {
                enabled: raw.knowledge_indexer_enabled,
                interval_ms: raw.knowledge_indexer_interval_ms,
                days_back: raw.knowledge_indexer_days_back,
            },
            retrieval: RetrievalConfig {
                top_k: raw.knowledge_search_top_k,
                min_score: raw.knowledge_search_min_score,
                hybrid: raw.knowledge_hybrid_search,
            },
            chat: ChatConfig {
                default_search_mode,
            },
            server: ServerConfig { port: raw.port },
        }
    }
}
