use serde::{Deserialize, Serialize};

/// The author of a message in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A part of a multi-part message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text(TextPart),
    Image(ImagePart),
}

/// A part of the message that contains text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextPart {
    pub text: String,
}

/// A part of the message that contains an image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImagePart {
    /// The MIME type of the image. E.g. "image/jpeg", "image/png".
    pub mime_type: String,
    /// The base64-encoded image data.
    pub image_data: String,
}

/// The content of a message: either a bare string or a sequence of parts.
/// Once a part sequence is non-empty it holds at most one text part, and that
/// part comes first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    /// Set only on the live assistant placeholder while tokens arrive.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_streaming: bool,
    /// The reply was cut short by a failure or a cancellation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_incomplete: bool,
    /// A synthetic message reporting a failed send.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

/// An item (usually a rendered document page) eligible for attachment to the
/// next outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextArtifact {
    /// Unique identity used for deduplication in the context store.
    pub id: String,
    /// The base64-encoded image data.
    pub image_data: String,
    /// The MIME type of the image.
    pub mime_type: String,
    /// The similarity score assigned by the search index, if retrieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// The source document, if retrieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// The page within the source document, if retrieved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_num: Option<u32>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}
