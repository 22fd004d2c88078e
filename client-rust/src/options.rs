use reqwest::Client;
use std::{collections::HashMap, time::Duration};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that can answer questions and help with tasks.";
pub const DEFAULT_ERROR_MESSAGE: &str =
    "An error occurred while processing your message. Please try again later.";
pub const DEFAULT_PAGE_BUDGET: u32 = 3;

/// Connection settings shared by the HTTP retriever and chat transport.
#[derive(Clone, Debug)]
pub struct HttpClientOptions {
    pub base_url: String,
    pub chat_path: String,
    pub search_path: String,
    pub upload_path: String,
    /// Upper bound on a whole search or upload request.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on the gap between two chunks of a streamed reply.
    pub idle_timeout: Duration,
    /// MIME type assumed for search result images.
    pub image_mime_type: String,
    pub headers: HashMap<String, String>,
    pub client: Option<Client>,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_path: "/api/chat".to_string(),
            search_path: "/api/search".to_string(),
            upload_path: "/api/upload".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            image_mime_type: "image/jpeg".to_string(),
            headers: HashMap::new(),
            client: None,
        }
    }
}

impl HttpClientOptions {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn build_client(&self) -> Result<Client, reqwest::Error> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Client::builder()
                .connect_timeout(self.connect_timeout)
                .build(),
        }
    }
}

/// Behaviour of one chat session.
#[derive(Clone, Debug)]
pub struct ChatSessionOptions {
    /// Permanent first message of the conversation.
    pub system_prompt: String,
    /// Number of pages requested per document search.
    pub page_budget: u32,
    /// Text of the message appended when a reply fails.
    pub error_message: String,
}

impl Default for ChatSessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            page_budget: DEFAULT_PAGE_BUDGET,
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
        }
    }
}
