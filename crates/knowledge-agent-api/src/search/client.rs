use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;

use super::models::{
    DocumentChunk, IndexStats, ScoredChunk, SearchOptions, UpsertReport, EMBEDDING_DIMENSION,
};
use super::schema::index_definition;
use super::VectorIndex;

const API_VERSION: &str = "2023-11-01";

/// Upstream limit on documents per indexing batch.
const MAX_UPSERT_BATCH: usize = 1000;

/// How many per-item error messages to keep when logging a failed batch.
const ERROR_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
struct IndexBatchResponse {
    value: Vec<IndexItemResult>,
}

#[derive(Debug, Deserialize)]
struct IndexItemResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

pub struct AzureSearchClient {
    http: Client,
    config: SearchConfig,
}

impl AzureSearchClient {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.config.endpoint, self.config.index_name, API_VERSION
        )
    }

    fn docs_url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{}?api-version={}",
            self.config.endpoint, self.config.index_name, operation, API_VERSION
        )
    }

    async fn post_docs(&self, operation: &str, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.docs_url(operation))
            .header("api-key", &self.config.admin_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("search index {operation} request failed"))?;
        Ok(response)
    }

    /// Submit one batch of index actions and count per-item outcomes.
    async fn submit_batch(&self, actions: Vec<Value>) -> Result<UpsertReport> {
        let response = self
            .post_docs("index", &json!({ "value": actions }))
            .await?;

        let status = response.status();
        // 207 carries per-item failures; anything else non-2xx aborts.
        if !status.is_success() && status != StatusCode::MULTI_STATUS {
            let body = response.text().await.unwrap_or_default();
            bail!("search index batch returned {status}: {body}");
        }

        let payload: IndexBatchResponse = response
            .json()
            .await
            .context("failed to parse index batch response")?;

        let mut report = UpsertReport::default();
        let mut samples = Vec::new();
        for item in payload.value {
            if item.status {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                if samples.len() < ERROR_SAMPLE_LIMIT {
                    samples.push(format!(
                        "{}: {}",
                        item.key,
                        item.error_message.unwrap_or_else(|| "unknown error".into())
                    ));
                }
            }
        }
        if report.failed > 0 {
            warn!(
                failed = report.failed,
                samples = ?samples,
                "index batch had per-item failures"
            );
        }
        Ok(report)
    }

    fn build_filter(options: &SearchOptions) -> Option<String> {
        let mut predicates = Vec::new();
        if let Some(site_url) = &options.site_url {
            predicates.push(format!("siteUrl eq '{}'", escape_odata(site_url)));
        }
        if let Some(file_types) = &options.file_types {
            if !file_types.is_empty() {
                let list = file_types
                    .iter()
                    .map(|t| escape_odata(t))
                    .collect::<Vec<_>>()
                    .join(",");
                predicates.push(format!("search.in(fileType, '{list}', ',')"));
            }
        }
        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" and "))
        }
    }

    fn vector_query_body(embedding: &[f32], options: &SearchOptions) -> Value {
        let mut body = json!({
            "count": false,
            "top": options.top_k,
            "select": "id,documentId,driveId,webUrl,siteUrl,siteName,documentTitle,fileType,chunkIndex,chunkText",
            "vectorQueries": [{
                "kind": "vector",
                "vector": embedding,
                "fields": "embedding",
                "k": options.top_k,
            }],
        });
        if let Some(filter) = Self::build_filter(options) {
            body["filter"] = Value::String(filter);
        }
        body
    }

    async fn run_search(&self, body: &Value, min_score: f32) -> Result<Vec<ScoredChunk>> {
        let response = self.post_docs("search", body).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("search query returned {status}: {text}");
        }

        let payload: SearchResponse<ScoredChunk> = response
            .json()
            .await
            .context("failed to parse search results")?;

        Ok(payload
            .value
            .into_iter()
            .filter(|hit| hit.score >= min_score)
            .collect())
    }
}

fn escape_odata(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl VectorIndex for AzureSearchClient {
    async fn ensure_index(&self) -> Result<()> {
        let response = self
            .http
            .get(self.index_url())
            .header("api-key", &self.config.admin_key)
            .send()
            .await
            .context("failed to describe search index")?;

        match response.status() {
            status if status.is_success() => {
                debug!(index = %self.config.index_name, "search index already exists");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                info!(index = %self.config.index_name, "creating search index");
                let created = self
                    .http
                    .put(self.index_url())
                    .header("api-key", &self.config.admin_key)
                    .json(&index_definition(&self.config.index_name))
                    .send()
                    .await
                    .context("failed to create search index")?;
                if !created.status().is_success() {
                    let status = created.status();
                    let body = created.text().await.unwrap_or_default();
                    bail!("index creation returned {status}: {body}");
                }
                Ok(())
            }
            status => bail!("describe index returned {status}"),
        }
    }

    async fn upsert_chunks(&self, chunks: &[DocumentChunk]) -> Result<UpsertReport> {
        for chunk in chunks {
            if chunk.embedding.len() != EMBEDDING_DIMENSION {
                bail!(
                    "chunk {} has embedding of length {}, expected {}",
                    chunk.id,
                    chunk.embedding.len(),
                    EMBEDDING_DIMENSION
                );
            }
        }

        let mut report = UpsertReport::default();
        for batch in chunks.chunks(MAX_UPSERT_BATCH) {
            let mut actions = Vec::with_capacity(batch.len());
            for chunk in batch {
                let mut action =
                    serde_json::to_value(chunk).context("failed to serialize chunk")?;
                action["@search.action"] = Value::String("mergeOrUpload".to_string());
                actions.push(action);
            }
            let batch_report = self.submit_batch(actions).await?;
            report.succeeded += batch_report.succeeded;
            report.failed += batch_report.failed;
        }
        Ok(report)
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<usize> {
        let body = json!({
            "filter": format!("documentId eq '{}'", escape_odata(document_id)),
            "select": "id",
            "top": 1000,
        });
        let response = self.post_docs("search", &body).await?;
        if !response.status().is_success() {
            let status = response.status();
            bail!("chunk lookup returned {status}");
        }

        let payload: SearchResponse<IdOnly> = response
            .json()
            .await
            .context("failed to parse chunk lookup response")?;

        if payload.value.is_empty() {
            return Ok(0);
        }

        let actions: Vec<Value> = payload
            .value
            .iter()
            .map(|item| json!({ "@search.action": "delete", "id": item.id }))
            .collect();
        let count = actions.len();
        self.submit_batch(actions).await?;

        debug!(document_id, count, "deleted existing chunks");
        Ok(count)
    }

    async fn search_similar(
        &self,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>> {
        let body = Self::vector_query_body(embedding, options);
        self.run_search(&body, options.min_score).await
    }

    async fn search_hybrid(
        &self,
        query: &str,
        embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>> {
        // The text query rides along verbatim; ranking stays dominated by
        // vector similarity.
        let mut body = Self::vector_query_body(embedding, options);
        body["search"] = Value::String(query.to_string());
        body["queryType"] = Value::String("simple".to_string());
        self.run_search(&body, options.min_score).await
    }

    async fn get_stats(&self) -> Result<IndexStats> {
        let url = format!(
            "{}/indexes/{}/stats?api-version={}",
            self.config.endpoint, self.config.index_name, API_VERSION
        );
        let response = self
            .http
            .get(url)
            .header("api-key", &self.config.admin_key)
            .send()
            .await
            .context("stats request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("stats endpoint returned {status}");
        }

        response.json().await.context("failed to parse index stats")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_list_sends_no_filter_clause() {
        let options = SearchOptions::default();
        assert_eq!(AzureSearchClient::build_filter(&options), None);

        let body = AzureSearchClient::vector_query_body(&[0.0; 4], &options);
        assert!(body.get("filter").is_none());
    }

    #[test]
    fn filter_predicates_are_and_joined() {
        let options = SearchOptions {
            site_url: Some("https://contoso.sharepoint.com/sites/kb".into()),
            file_types: Some(vec!["pdf".into(), "docx".into()]),
            ..SearchOptions::default()
        };
        assert_eq!(
            AzureSearchClient::build_filter(&options).unwrap(),
            "siteUrl eq 'https://contoso.sharepoint.com/sites/kb' \
             and search.in(fileType, 'pdf,docx', ',')"
        );
    }

    #[test]
    fn single_quotes_are_escaped() {
        let options = SearchOptions {
            site_url: Some("https://contoso.sharepoint.com/sites/o'brien".into()),
            ..SearchOptions::default()
        };
        assert!(AzureSearchClient::build_filter(&options)
            .unwrap()
            .contains("o''brien"));
    }

    #[test]
    fn vector_query_requests_top_k_neighbors() {
        let options = SearchOptions {
            top_k: 20,
            ..SearchOptions::default()
        };
        let body = AzureSearchClient::vector_query_body(&[0.1, 0.2], &options);
        assert_eq!(body["vectorQueries"][0]["k"], 20);
        assert_eq!(body["top"], 20);
        // the embedding itself is never selected back
        assert!(!body["select"].as_str().unwrap().contains("embedding"));
    }
}
