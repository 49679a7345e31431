use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::graph::client::{derive_site, split_host_path};
use crate::graph::models::{FileType, KnowledgeDocument};
use crate::graph::DocumentProvider;

use super::html::strip_html;
use super::parser;

/// Documents whose normalized extract is shorter than this are dropped as
/// having insufficient content.
pub const MIN_CONTENT_LEN: usize = 50;

static SPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static NEWLINE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Decodes provider documents into normalized plain text, dispatching on
/// file type. Binary decoding runs on the blocking pool.
#[derive(Clone)]
pub struct ContentExtractor {
    provider: Arc<dyn DocumentProvider>,
}

impl ContentExtractor {
    pub fn new(provider: Arc<dyn DocumentProvider>) -> Self {
        Self { provider }
    }

    pub async fn extract(&self, document: &KnowledgeDocument) -> Result<String> {
        let raw = match document.file_type {
            FileType::Pdf => {
                let bytes = self.provider.download_bytes(document).await?;
                decode_blocking(bytes, parser::pdf_text).await?
            }
            FileType::Doc | FileType::Docx => {
                let bytes = self.provider.download_bytes(document).await?;
                decode_blocking(bytes, parser::word_text).await?
            }
            FileType::Aspx => self.extract_page(document).await?,
            FileType::Unknown => String::new(),
        };

        Ok(normalize_text(&raw))
    }

    /// Extract a single document addressed only by URL (the chat file tool).
    pub async fn extract_from_url(&self, web_url: &str) -> Result<String> {
        let (site_url, site_name) = derive_site(web_url);
        let name = web_url.rsplit('/').next().unwrap_or_default().to_string();
        let document = KnowledgeDocument {
            id: web_url.to_string(),
            file_type: FileType::from_name(&name),
            title: name,
            web_url: web_url.to_string(),
            last_modified: Utc::now(),
            site_url,
            site_name,
            drive_id: None,
            drive_item_id: None,
        };
        self.extract(&document).await
    }

    async fn extract_page(&self, document: &KnowledgeDocument) -> Result<String> {
        let (host, _) = split_host_path(&document.site_url)
            .with_context(|| format!("cannot parse site URL {}", document.site_url))?;
        let site_id = self
            .provider
            .resolve_site(host, &document.site_name)
            .await?;

        let page_name = document.web_url.rsplit('/').next().unwrap_or_default();
        let parts = self.provider.get_page_content(&site_id, page_name).await?;

        if parts.is_empty() {
            debug!(page = %page_name, "no structured parts, falling back to raw page file");
            let bytes = self.provider.download_by_url(&document.web_url).await?;
            return Ok(strip_html(&String::from_utf8_lossy(&bytes)));
        }

        let mut sections = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(html) = part.inner_html {
                sections.push(strip_html(&html));
            } else if let Some(text) = part.text {
                sections.push(text);
            }
        }
        Ok(sections.join("\n\n"))
    }
}

async fn decode_blocking(
    bytes: Bytes,
    decode: fn(&[u8]) -> Result<String>,
) -> Result<String> {
    tokio::task::spawn_blocking(move || decode(&bytes))
        .await
        .context("document decode task failed")?
}

/// Normalization applied to every extract: CRLF/CR to LF, space and tab
/// runs to a single space, three-or-more newlines to exactly two, each
/// line trimmed, ends trimmed.
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let spaces = SPACE_RUN_RE.replace_all(&unified, " ");
    let newlines = NEWLINE_RUN_RE.replace_all(&spaces, "\n\n");
    let trimmed_lines: Vec<&str> = newlines.lines().map(str::trim).collect();
    let rejoined = trimmed_lines.join("\n");
    NEWLINE_RUN_RE.replace_all(&rejoined, "\n\n").trim().to_string()
}
