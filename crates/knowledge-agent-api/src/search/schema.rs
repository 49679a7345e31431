use serde_json::{json, Value};

use super::models::EMBEDDING_DIMENSION;

pub const VECTOR_PROFILE: &str = "knowledge-vector-profile";
pub const HNSW_ALGORITHM: &str = "knowledge-hnsw";

/// Full index definition: the `DocumentChunk` field set plus the HNSW
/// vector-search configuration. Created once; schema changes mean the
/// operator deletes and recreates the index.
pub fn index_definition(name: &str) -> Value {
    json!({
        "name": name,
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true, "filterable": true },
            { "name": "documentId", "type": "Edm.String", "filterable": true },
            { "name": "driveId", "type": "Edm.String", "filterable": false },
            { "name": "webUrl", "type": "Edm.String", "filterable": false },
            { "name": "siteUrl", "type": "Edm.String", "filterable": true, "facetable": true },
            { "name": "siteName", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true },
            { "name": "documentTitle", "type": "Edm.String", "searchable": true },
            { "name": "fileType", "type": "Edm.String", "filterable": true, "facetable": true },
            { "name": "chunkIndex", "type": "Edm.Int32", "filterable": true },
            { "name": "chunkText", "type": "Edm.String", "searchable": true },
            {
                "name": "embedding",
                "type": "Collection(Edm.Single)",
                "searchable": true,
                "retrievable": false,
                "dimensions": EMBEDDING_DIMENSION,
                "vectorSearchProfile": VECTOR_PROFILE
            },
            { "name": "documentModifiedAt", "type": "Edm.DateTimeOffset", "filterable": true },
            { "name": "indexedAt", "type": "Edm.DateTimeOffset", "filterable": true }
        ],
        "vectorSearch": {
            "algorithms": [
                {
                    "name": HNSW_ALGORITHM,
                    "kind": "hnsw",
                    "hnswParameters": {
                        "m": 4,
                        "efConstruction": 400,
                        "efSearch": 500,
                        "metric": "cosine"
                    }
                }
            ],
            "profiles": [
                { "name": VECTOR_PROFILE, "algorithm": HNSW_ALGORITHM }
            ]
        }
    })
}
