use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::graph::models::ProbeTarget;
use crate::graph::DocumentProvider;

/// Per-request access gate. Decisions are memoized by document id and the
/// whole filter is discarded with the request; nothing is shared across
/// chat requests.
pub struct PermissionFilter {
    provider: Arc<dyn DocumentProvider>,
    user_token: String,
    decisions: Mutex<HashMap<String, bool>>,
}

impl PermissionFilter {
    pub fn new(provider: Arc<dyn DocumentProvider>, user_token: String) -> Self {
        Self {
            provider,
            user_token,
            decisions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_accessible(&self, target: &ProbeTarget) -> bool {
        if let Some(&decision) = self
            .decisions
            .lock()
            .expect("permission cache poisoned")
            .get(&target.document_id)
        {
            return decision;
        }

        let decision = self.provider.probe_access(target, &self.user_token).await;
        debug!(document_id = %target.document_id, accessible = decision, "permission probe");

        self.decisions
            .lock()
            .expect("permission cache poisoned")
            .insert(target.document_id.clone(), decision);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MockDocumentProvider;

    fn target(id: &str) -> ProbeTarget {
        ProbeTarget {
            document_id: id.to_string(),
            drive_id: Some("drive-1".to_string()),
            web_url: format!("https://contoso.sharepoint.com/sites/kb/{id}.pdf"),
        }
    }

    #[tokio::test]
    async fn probe_result_is_memoized_per_document() {
        let mut provider = MockDocumentProvider::new();
        provider
            .expect_probe_access()
            .times(1)
            .returning(|_, _| true);

        let filter = PermissionFilter::new(Arc::new(provider), "token".into());
        assert!(filter.is_accessible(&target("doc-1")).await);
        // second call must hit the cache, not the provider
        assert!(filter.is_accessible(&target("doc-1")).await);
    }

    #[tokio::test]
    async fn denial_is_memoized_too() {
        let mut provider = MockDocumentProvider::new();
        provider
            .expect_probe_access()
            .times(1)
            .returning(|_, _| false);

        let filter = PermissionFilter::new(Arc::new(provider), "token".into());
        assert!(!filter.is_accessible(&target("doc-2")).await);
        assert!(!filter.is_accessible(&target("doc-2")).await);
    }

    #[tokio::test]
    async fn distinct_documents_probe_separately() {
        let mut provider = MockDocumentProvider::new();
        provider
            .expect_probe_access()
            .times(2)
            .returning(|target, _| target.document_id == "doc-open");

        let filter = PermissionFilter::new(Arc::new(provider), "token".into());
        assert!(filter.is_accessible(&target("doc-open")).await);
        assert!(!filter.is_accessible(&target("doc-closed")).await);
    }
}
