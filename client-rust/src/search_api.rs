use serde::Deserialize;
use serde_json::Value;

/// One element of the search endpoint's JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    /// A stable identity, when the index provides one.
    #[serde(default)]
    pub id: Option<String>,
    /// Numeric or string document identity.
    #[serde(default)]
    pub doc_id: Option<Value>,
    #[serde(default)]
    pub page_num: Option<u32>,
    #[serde(default)]
    pub score: Option<f64>,
    /// The base64-encoded page image.
    #[serde(default)]
    pub base64: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl SearchResult {
    /// The document identity as text, regardless of its JSON type.
    pub fn doc_id_string(&self) -> Option<String> {
        match self.doc_id.as_ref()? {
            Value::Null => None,
            Value::String(doc_id) => Some(doc_id.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Body of the upload endpoint's response.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
