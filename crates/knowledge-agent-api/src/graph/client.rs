use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::GraphConfig;

use super::kql::SearchQuery;
use super::models::{
    FileType, KnowledgeDocument, PagePart, ProbeTarget, SearchHit, SiteInfo, UserProfile,
};
use super::DocumentProvider;

const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Refresh the app token this long before it actually expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Graph client holding the application credential. The token cache is the
/// only mutable state; everything else is per-call.
pub struct GraphClient {
    http: Client,
    config: GraphConfig,
    graph_base: String,
    login_base: String,
    token: RwLock<Option<CachedToken>>,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Self {
        Self::with_endpoints(config, DEFAULT_GRAPH_BASE, DEFAULT_LOGIN_BASE)
    }

    /// Point the client at alternative endpoints; used by tests.
    pub fn with_endpoints(
        config: GraphConfig,
        graph_base: impl Into<String>,
        login_base: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
            graph_base: graph_base.into(),
            login_base: login_base.into(),
            token: RwLock::new(None),
        }
    }

    async fn app_token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at.saturating_duration_since(Instant::now())
                    > TOKEN_EXPIRY_MARGIN
                {
                    return Ok(token.value.clone());
                }
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base, self.config.tenant_id
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", "https://graph.microsoft.com/.default"),
            ])
            .send()
            .await
            .context("failed to reach the token endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("token endpoint returned {status}");
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("failed to parse token response")?;

        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(token.access_token)
    }

    async fn raw_search(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        let token = self.app_token().await?;
        let body = json!({
            "requests": [{
                "entityTypes": ["driveItem", "listItem"],
                "query": { "queryString": query.build() },
                "from": 0,
                "size": query.size(),
                "region": self.config.geo,
                "fields": [
                    "id", "name", "title", "webUrl",
                    "lastModifiedDateTime", "parentReference"
                ],
            }]
        });

        let response = self
            .http
            .post(format!("{}/search/query", self.graph_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .context("search request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("search endpoint returned {status}");
        }

        let payload: Value = response
            .json()
            .await
            .context("failed to parse search response")?;

        let mut hits = Vec::new();
        if let Some(containers) = payload
            .pointer("/value/0/hitsContainers")
            .and_then(Value::as_array)
        {
            for container in containers {
                if let Some(container_hits) = container.get("hits").and_then(Value::as_array) {
                    hits.extend(container_hits.iter().cloned());
                }
            }
        }
        Ok(hits)
    }

    async fn get_json(&self, url: &str, bearer: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("{url} returned {status}");
        }

        response.json().await.context("failed to parse response body")
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let token = self.app_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .with_context(|| format!("download from {url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("download from {url} returned {status}");
        }

        response.bytes().await.context("failed to read download body")
    }
}

/// Split an absolute URL into hostname and url-path.
pub(crate) fn split_host_path(web_url: &str) -> Option<(&str, &str)> {
    let rest = web_url
        .strip_prefix("https://")
        .or_else(|| web_url.strip_prefix("http://"))?;
    match rest.find('/') {
        Some(idx) => Some((&rest[..idx], &rest[idx..])),
        None => Some((rest, "/")),
    }
}

/// Derive the owning site collection URL and name from a document URL.
/// Falls back to the host root when the path is not under `/sites/`.
pub(crate) fn derive_site(web_url: &str) -> (String, String) {
    if let Some((host, path)) = split_host_path(web_url) {
        if let Some(rest) = path.strip_prefix("/sites/") {
            let name = rest.split('/').next().unwrap_or_default();
            if !name.is_empty() {
                return (format!("https://{host}/sites/{name}"), name.to_string());
            }
        }
        return (format!("https://{host}"), host.to_string());
    }
    (web_url.to_string(), String::new())
}

fn hit_resource(hit: &Value) -> &Value {
    hit.get("resource").unwrap_or(hit)
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn document_from_hit(hit: &Value) -> Option<KnowledgeDocument> {
    let resource = hit_resource(hit);
    let web_url = resource.get("webUrl").and_then(Value::as_str)?.to_string();
    let id = resource
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| hit.get("hitId").and_then(Value::as_str))?
        .to_string();

    let name = resource
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            web_url
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });

    let drive_id = resource
        .pointer("/parentReference/driveId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let (site_url, site_name) = derive_site(&web_url);

    Some(KnowledgeDocument {
        file_type: FileType::from_name(&name),
        title: name,
        last_modified: parse_timestamp(resource.get("lastModifiedDateTime"))
            .unwrap_or_else(Utc::now),
        drive_item_id: drive_id.is_some().then(|| id.clone()),
        id,
        web_url,
        site_url,
        site_name,
        drive_id,
    })
}

fn search_hit_from_value(hit: &Value) -> Option<SearchHit> {
    let resource = hit_resource(hit);
    let web_url = resource.get("webUrl").and_then(Value::as_str)?.to_string();
    let name = resource
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_else(|| web_url.rsplit('/').next().unwrap_or_default())
        .to_string();
    let drive_id = resource
        .pointer("/parentReference/driveId")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(SearchHit {
        name,
        summary: hit
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        item_id: drive_id
            .is_some()
            .then(|| resource.get("id").and_then(Value::as_str))
            .flatten()
            .map(str::to_string),
        drive_id,
        last_modified: parse_timestamp(resource.get("lastModifiedDateTime")),
        web_url,
    })
}

#[async_trait]
impl DocumentProvider for GraphClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<KnowledgeDocument>> {
        let hits = self.raw_search(query).await?;
        let documents: Vec<KnowledgeDocument> =
            hits.iter().filter_map(document_from_hit).collect();
        debug!(
            hits = hits.len(),
            documents = documents.len(),
            "mapped search hits"
        );
        Ok(documents)
    }

    async fn search_hits(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let hits = self.raw_search(query).await?;
        Ok(hits.iter().filter_map(search_hit_from_value).collect())
    }

    async fn download_bytes(&self, document: &KnowledgeDocument) -> Result<Bytes> {
        match (&document.drive_id, &document.drive_item_id) {
            (Some(drive_id), Some(item_id)) => {
                self.get_bytes(&format!(
                    "{}/drives/{drive_id}/items/{item_id}/content",
                    self.graph_base
                ))
                .await
            }
            _ => self.download_by_url(&document.web_url).await,
        }
    }

    async fn download_by_url(&self, web_url: &str) -> Result<Bytes> {
        let (host, path) = split_host_path(web_url)
            .with_context(|| format!("cannot parse document URL {web_url}"))?;
        self.get_bytes(&format!("{}/sites/{host}:{path}:/content", self.graph_base))
            .await
    }

    async fn resolve_site(&self, hostname: &str, site_name: &str) -> Result<String> {
        let token = self.app_token().await?;
        let payload = self
            .get_json(
                &format!("{}/sites/{hostname}:/sites/{site_name}", self.graph_base),
                &token,
            )
            .await?;
        payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("site response had no id")
    }

    async fn get_page_content(&self, site_id: &str, page_name: &str) -> Result<Vec<PagePart>> {
        let token = self.app_token().await?;
        let response = self
            .http
            .get(format!("{}/sites/{site_id}/pages", self.graph_base))
            .query(&[
                ("$filter", format!("name eq '{page_name}'")),
                ("$expand", "webParts".to_string()),
            ])
            .bearer_auth(&token)
            .send()
            .await
            .context("page request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            bail!("pages endpoint returned {status}");
        }

        let payload: Value = response
            .json()
            .await
            .context("failed to parse pages response")?;

        let mut parts = Vec::new();
        if let Some(web_parts) = payload
            .pointer("/value/0/webParts")
            .and_then(Value::as_array)
        {
            for part in web_parts {
                parts.push(PagePart {
                    inner_html: part
                        .get("innerHtml")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    text: part
                        .pointer("/data/properties/text")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
        }
        Ok(parts)
    }

    async fn probe_access(&self, target: &ProbeTarget, user_token: &str) -> bool {
        let url = match (&target.drive_id, target.document_id.as_str()) {
            (Some(drive_id), item_id) if !item_id.is_empty() => {
                format!("{}/drives/{drive_id}/items/{item_id}?$select=id", self.graph_base)
            }
            _ => match split_host_path(&target.web_url) {
                Some((host, path)) => format!("{}/sites/{host}:{path}?$select=id", self.graph_base),
                None => {
                    warn!(web_url = %target.web_url, "unparsable probe URL, denying access");
                    return false;
                }
            },
        };

        match self.http.get(&url).bearer_auth(user_token).send().await {
            Ok(response) if response.status().is_success() => {
                // A success with an unreadable body is still ambiguous.
                match response.json::<Value>().await {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(document_id = %target.document_id, error = %err, "malformed probe response, denying access");
                        false
                    }
                }
            }
            Ok(response) => {
                let status = response.status();
                if status != StatusCode::FORBIDDEN && status != StatusCode::NOT_FOUND {
                    warn!(document_id = %target.document_id, %status, "ambiguous probe result, denying access");
                } else {
                    debug!(document_id = %target.document_id, %status, "access denied by provider");
                }
                false
            }
            Err(err) => {
                warn!(document_id = %target.document_id, error = %err, "probe request failed, denying access");
                false
            }
        }
    }

    async fn get_user_profile(&self, user_token: &str) -> Result<UserProfile> {
        let me = self
            .get_json(
                &format!(
                    "{}/me?$select=displayName,mail,jobTitle,department,companyName,officeLocation",
                    self.graph_base
                ),
                user_token,
            )
            .await?;

        let manager = match self
            .get_json(&format!("{}/me/manager?$select=displayName", self.graph_base), user_token)
            .await
        {
            Ok(value) => value
                .get("displayName")
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(err) => {
                debug!(error = %err, "manager lookup failed, omitting");
                None
            }
        };

        let str_field = |key: &str| {
            me.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(UserProfile {
            display_name: str_field("displayName").unwrap_or_default(),
            mail: str_field("mail").unwrap_or_default(),
            job_title: str_field("jobTitle"),
            department: str_field("department"),
            company_name: str_field("companyName"),
            office_location: str_field("officeLocation"),
            manager,
        })
    }

    async fn get_site(&self, site_url: &str) -> Result<SiteInfo> {
        let (host, path) = split_host_path(site_url)
            .with_context(|| format!("cannot parse site URL {site_url}"))?;
        let token = self.app_token().await?;
        let payload = self
            .get_json(&format!("{}/sites/{host}:{path}", self.graph_base), &token)
            .await?;

        Ok(SiteInfo {
            id: payload
                .get("id")
                .and_then(Value::as_str)
                .context("site response had no id")?
                .to_string(),
            name: payload
                .get("displayName")
                .or_else(|| payload.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            web_url: payload
                .get("webUrl")
                .and_then(Value::as_str)
                .unwrap_or(site_url)
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_path_variants() {
        assert_eq!(
            split_host_path("https://contoso.sharepoint.com/sites/kb/doc.pdf"),
            Some(("contoso.sharepoint.com", "/sites/kb/doc.pdf"))
        );
        assert_eq!(
            split_host_path("https://contoso.sharepoint.com"),
            Some(("contoso.sharepoint.com", "/"))
        );
        assert_eq!(split_host_path("not a url"), None);
    }

    #[test]
    fn derive_site_from_document_url() {
        let (url, name) = derive_site("https://contoso.sharepoint.com/sites/kb/Docs/a.pdf");
        assert_eq!(url, "https://contoso.sharepoint.com/sites/kb");
        assert_eq!(name, "kb");

        let (url, name) = derive_site("https://contoso.sharepoint.com/personal/x/a.pdf");
        assert_eq!(url, "https://contoso.sharepoint.com");
        assert_eq!(name, "contoso.sharepoint.com");
    }

    #[test]
    fn malformed_hit_is_skipped() {
        assert!(document_from_hit(&json!({ "resource": { "name": "no-url.pdf" } })).is_none());
    }

    #[test]
    fn drive_hit_maps_identifiers() {
        let hit = json!({
            "hitId": "h1",
            "resource": {
                "id": "item-9",
                "name": "Handbook.docx",
                "webUrl": "https://contoso.sharepoint.com/sites/hr/Handbook.docx",
                "lastModifiedDateTime": "2024-01-05T08:00:00Z",
                "parentReference": { "driveId": "drive-3" }
            }
        });
        let doc = document_from_hit(&hit).unwrap();
        assert_eq!(doc.id, "item-9");
        assert_eq!(doc.file_type, FileType::Docx);
        assert_eq!(doc.drive_id.as_deref(), Some("drive-3"));
        assert_eq!(doc.drive_item_id.as_deref(), Some("item-9"));
        assert_eq!(doc.site_name, "hr");
    }

    #[test]
    fn list_item_hit_has_no_drive_identifiers() {
        let hit = json!({
            "resource": {
                "id": "page-1",
                "name": "Welcome.aspx",
                "webUrl": "https://contoso.sharepoint.com/sites/kb/SitePages/Welcome.aspx",
                "parentReference": { "siteId": "site-1" }
            }
        });
        let doc = document_from_hit(&hit).unwrap();
        assert_eq!(doc.file_type, FileType::Aspx);
        assert!(doc.drive_id.is_none());
        assert!(doc.drive_item_id.is_none());
    }
}
