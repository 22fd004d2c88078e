use crate::{ImagePart, Message, MessageContent, Part, Role};
use serde::{Deserialize, Serialize};

/// Body of the streaming chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessageParam>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageParam {
    pub role: Role,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ChatImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatImageUrl {
    pub url: String,
}

/// Payload of an error event on the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEvent {
    pub error: String,
}

/// Build the request body from the conversation history. Synthetic error
/// messages, the live placeholder and empty assistant turns are not part of
/// what the model sees.
pub fn convert_to_chat_request(messages: &[Message]) -> ChatRequest {
    ChatRequest {
        messages: messages
            .iter()
            .filter(|message| !message.is_error && !message.is_streaming)
            .filter(|message| !(message.role == Role::Assistant && message.content.is_empty()))
            .map(convert_to_chat_message)
            .collect(),
    }
}

fn convert_to_chat_message(message: &Message) -> ChatMessageParam {
    let content = match &message.content {
        MessageContent::Text(text) => ChatContent::Text(text.clone()),
        MessageContent::Parts(parts) => ChatContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    Part::Text(part) => ChatContentPart::Text {
                        text: part.text.clone(),
                    },
                    Part::Image(part) => convert_to_image_url(part),
                })
                .collect(),
        ),
    };

    ChatMessageParam {
        role: message.role,
        content,
    }
}

fn convert_to_image_url(part: &ImagePart) -> ChatContentPart {
    ChatContentPart::ImageUrl {
        image_url: ChatImageUrl {
            url: part.data_url(),
        },
    }
}
