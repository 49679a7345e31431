use chrono::{DateTime, Duration, Utc};

use super::models::FileType;

/// Maximum hits the search endpoint returns per request.
pub const MAX_SEARCH_SIZE: usize = 500;

/// Managed property flagging a document as opted into the knowledge index.
const INDEX_MARKER: &str = "KnowledgeAgentIndex:1";

/// Composable keyword query with conjunction semantics: clauses are
/// `FIELD:VALUE` tokens joined by spaces (implicit AND), ranges are
/// `FIELD>=YYYY-MM-DD` at day granularity in UTC.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    clauses: Vec<String>,
    size: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
            size: MAX_SEARCH_SIZE,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.min(MAX_SEARCH_SIZE);
        self
    }

    /// Free-text keywords, placed before the field clauses.
    pub fn keywords(mut self, keywords: &str) -> Self {
        let trimmed = keywords.trim();
        if !trimmed.is_empty() {
            self.clauses.push(trimmed.to_string());
        }
        self
    }

    /// The fixed marker clause selecting documents opted into indexing.
    pub fn index_marker(mut self) -> Self {
        self.clauses.push(INDEX_MARKER.to_string());
        self
    }

    /// Whitelist of indexable file types, OR-joined inside one clause.
    pub fn file_types(mut self, types: &[FileType]) -> Self {
        if types.is_empty() {
            return self;
        }
        let alternatives: Vec<String> = types
            .iter()
            .map(|t| format!("filetype:{}", t.as_str()))
            .collect();
        self.clauses.push(format!("({})", alternatives.join(" OR ")));
        self
    }

    /// Scope to one site collection by its URL path.
    pub fn path(mut self, site_url: &str) -> Self {
        let trimmed = site_url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.clauses.push(format!("path:\"{trimmed}\""));
        }
        self
    }

    /// Scope by the `site:` property, as the chat KQL tool issues it.
    pub fn site(mut self, site_url: &str) -> Self {
        let trimmed = site_url.trim().trim_end_matches('/');
        if !trimmed.is_empty() {
            self.clauses.push(format!("site:{trimmed}"));
        }
        self
    }

    /// Last-modified range spanning `[now - days_back, now]`, day-granular.
    pub fn modified_within(mut self, days_back: i64, now: DateTime<Utc>) -> Self {
        let from = now - Duration::days(days_back.max(0));
        self.clauses
            .push(format!("LastModifiedTime>={}", from.format("%Y-%m-%d")));
        self.clauses
            .push(format!("LastModifiedTime<={}", now.format("%Y-%m-%d")));
        self
    }

    pub fn build(&self) -> String {
        self.clauses.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clauses_join_with_spaces() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let query = SearchQuery::new()
            .index_marker()
            .file_types(&FileType::INDEXABLE)
            .path("https://contoso.sharepoint.com/sites/kb/")
            .modified_within(30, now);

        assert_eq!(
            query.build(),
            "KnowledgeAgentIndex:1 \
             (filetype:pdf OR filetype:doc OR filetype:docx OR filetype:aspx) \
             path:\"https://contoso.sharepoint.com/sites/kb\" \
             LastModifiedTime>=2024-02-14 LastModifiedTime<=2024-03-15"
        );
    }

    #[test]
    fn size_is_capped_at_provider_limit() {
        assert_eq!(SearchQuery::new().with_size(2000).size(), MAX_SEARCH_SIZE);
        assert_eq!(SearchQuery::new().with_size(25).size(), 25);
    }

    #[test]
    fn empty_site_scope_adds_no_clause() {
        let query = SearchQuery::new().index_marker().path("  ");
        assert_eq!(query.build(), "KnowledgeAgentIndex:1");
    }

    #[test]
    fn keyword_query_for_kql_tool() {
        let query = SearchQuery::new()
            .keywords("vacation policy")
            .site("https://contoso.sharepoint.com/sites/hr")
            .file_types(&FileType::INDEXABLE)
            .with_size(10);
        let built = query.build();
        assert!(built.starts_with("vacation policy site:"));
        assert!(built.contains("filetype:aspx"));
    }

    #[test]
    fn negative_days_back_clamps_to_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let built = SearchQuery::new().modified_within(-5, now).build();
        assert!(built.contains("LastModifiedTime>=2024-03-15"));
    }
}
