use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File formats the indexer understands. Anything else extracts to empty
/// text and is skipped by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Doc,
    Docx,
    Aspx,
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Doc => "doc",
            FileType::Docx => "docx",
            FileType::Aspx => "aspx",
            FileType::Unknown => "unknown",
        }
    }

    /// Infer from a file name's extension; unknown extensions (or no
    /// extension at all) map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.rsplit('.').next().map(|ext| ext.to_lowercase()) {
            Some(ext) if ext == "pdf" => FileType::Pdf,
            Some(ext) if ext == "doc" => FileType::Doc,
            Some(ext) if ext == "docx" => FileType::Docx,
            Some(ext) if ext == "aspx" => FileType::Aspx,
            _ => FileType::Unknown,
        }
    }

    pub const INDEXABLE: [FileType; 4] = [FileType::Pdf, FileType::Doc, FileType::Docx, FileType::Aspx];
}

/// A candidate document discovered by a provider search. Created per search
/// hit, immutable, discarded after the pipeline pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub web_url: String,
    pub file_type: FileType,
    pub last_modified: DateTime<Utc>,
    pub site_url: String,
    pub site_name: String,
    pub drive_id: Option<String>,
    pub drive_item_id: Option<String>,
}

/// One web part of a markup page, as returned by the structured page
/// endpoint. Extraction prefers `inner_html` and falls back to `text`.
#[derive(Debug, Clone)]
pub struct PagePart {
    pub inner_html: Option<String>,
    pub text: Option<String>,
}

/// A search hit as the `sharepoint_search` tool reports it to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub name: String,
    pub summary: String,
    pub web_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// The minimal identity needed to re-verify a user's access to a document.
/// Built either from a search hit or from a stored chunk's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub document_id: String,
    pub drive_id: Option<String>,
    pub web_url: String,
}

/// Delegated user's profile, fetched with the user's own credential.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    pub mail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub office_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub web_url: String,
}
