use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Response,
};
use serde::Deserialize;
use std::collections::HashMap;

/// `{"error": "..."}` bodies returned by the backend on failure.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Convert user supplied header pairs into a `HeaderMap`.
pub fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap, String> {
    let mut header_map = HeaderMap::new();

    for (key, value) in headers {
        let header_name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|error| format!("Invalid header name '{key}': {error}"))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|error| format!("Invalid header value for '{key}': {error}"))?;
        header_map.insert(header_name, header_value);
    }

    Ok(header_map)
}

/// Read the failure reason from a non-success response. Prefers the `error`
/// field of a JSON body, then the raw body, then the status text.
pub async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(&body) {
        return error;
    }
    if !body.trim().is_empty() {
        return body;
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
