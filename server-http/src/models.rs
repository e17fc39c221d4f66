use dismissible::domain::response::GetOrCreateResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Item Operation Models ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub items: Vec<GetOrCreateResponse>,
}

// === Common Models ===

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
