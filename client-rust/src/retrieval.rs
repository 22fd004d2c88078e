use crate::{
    client_utils,
    search_api::{SearchResult, UploadResponse},
    ConfigError, ContextArtifact, HttpClientOptions, RetrievalError, RetrievalResult, UploadError,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::HeaderMap, multipart, Client};
use std::{collections::HashMap, time::Duration};
use tracing::{debug, warn};

/// Searches the document index.
///
/// A single-shot request: implementations do not retry. An empty result is
/// `Ok(vec![])`, never an error.
#[async_trait::async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn search(&self, query: &str, page_budget: u32)
        -> RetrievalResult<Vec<ContextArtifact>>;
}

/// Retriever backed by the HTTP search endpoint.
pub struct HttpRetriever {
    client: Client,
    search_url: String,
    upload_url: String,
    headers: HeaderMap,
    request_timeout: Duration,
    image_mime_type: String,
}

impl HttpRetriever {
    pub fn new(options: &HttpClientOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            client: options.build_client()?,
            search_url: options.endpoint(&options.search_path),
            upload_url: options.endpoint(&options.upload_path),
            headers: client_utils::build_headers(&options.headers).map_err(ConfigError::Header)?,
            request_timeout: options.request_timeout,
            image_mime_type: options.image_mime_type.clone(),
        })
    }

    /// Upload a document to be indexed. Returns the server's success message.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, UploadError> {
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(bytes).file_name(file_name.to_string()),
        );

        let response = self
            .client
            .post(&self.upload_url)
            .headers(self.headers.clone())
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message: client_utils::error_message(response).await,
            });
        }

        let body: UploadResponse = response.json().await?;
        match body {
            UploadResponse {
                error: Some(message),
                ..
            } => Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            }),
            UploadResponse { success, .. } => Ok(success.unwrap_or_default()),
        }
    }
}

#[async_trait::async_trait]
impl DocumentRetriever for HttpRetriever {
    async fn search(
        &self,
        query: &str,
        page_budget: u32,
    ) -> RetrievalResult<Vec<ContextArtifact>> {
        let page_budget = page_budget.max(1);
        debug!(query, page_budget, "searching documents");

        let response = self
            .client
            .get(&self.search_url)
            .headers(self.headers.clone())
            .query(&[("query", query.to_string()), ("k", page_budget.to_string())])
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::ServerRejected {
                status: status.as_u16(),
                message: client_utils::error_message(response).await,
            });
        }

        let body = response.text().await?;
        let results: Vec<SearchResult> = serde_json::from_str(&body)
            .map_err(|e| RetrievalError::Malformed(format!("Failed to parse results: {e}")))?;

        Ok(into_artifacts(results, &self.image_mime_type))
    }
}

/// Convert search results into artifacts. Results without a decodable image
/// are dropped. Ids fall back to `{doc_id}-{page_num}-{ordinal}`, where the
/// ordinal counts repeats of the same page within this batch, so the same
/// page gets the same id across searches.
pub fn into_artifacts(results: Vec<SearchResult>, mime_type: &str) -> Vec<ContextArtifact> {
    let mut seen: HashMap<(Option<String>, Option<u32>), usize> = HashMap::new();
    let mut artifacts = Vec::with_capacity(results.len());

    for result in results {
        let doc_id = result.doc_id_string();
        let ordinal = {
            let count = seen.entry((doc_id.clone(), result.page_num)).or_insert(0);
            let ordinal = *count;
            *count += 1;
            ordinal
        };

        let Some(image_data) = result.base64 else {
            debug!(?doc_id, page_num = result.page_num, "skipping result without image");
            continue;
        };
        if let Err(error) = STANDARD.decode(&image_data) {
            warn!(?doc_id, page_num = result.page_num, %error, "skipping result with invalid image data");
            continue;
        }

        let id = result.id.unwrap_or_else(|| {
            format!(
                "{}-{}-{ordinal}",
                doc_id.as_deref().unwrap_or("unknown"),
                result
                    .page_num
                    .map_or_else(|| "unknown".to_string(), |page| page.to_string()),
            )
        });

        artifacts.push(ContextArtifact {
            id,
            image_data,
            mime_type: mime_type.to_string(),
            score: result.score,
            doc_id,
            page_num: result.page_num,
        });
    }

    artifacts
}
