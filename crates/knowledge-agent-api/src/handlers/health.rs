use axum::Json;
use serde_json::{json, Value};

/// Liveness only; no auth, no upstream calls.
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
