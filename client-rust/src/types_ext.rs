use crate::{ContextArtifact, ImagePart, Message, MessageContent, Part, Role, TextPart};
use base64::{engine::general_purpose::STANDARD, Engine as _};

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for TextPart {
    fn from(value: &str) -> Self {
        Self {
            text: value.to_string(),
        }
    }
}

impl From<String> for TextPart {
    fn from(value: String) -> Self {
        Self { text: value }
    }
}

impl ImagePart {
    pub fn new(image_data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            image_data: image_data.into(),
        }
    }

    /// Render the image as a `data:` URL.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_data)
    }
}

impl From<&ContextArtifact> for ImagePart {
    fn from(artifact: &ContextArtifact) -> Self {
        Self {
            mime_type: artifact.mime_type.clone(),
            image_data: artifact.image_data.clone(),
        }
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPart::new(text))
    }

    pub fn image(image_data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image(ImagePart::new(image_data, mime_type))
    }
}

impl MessageContent {
    /// Concatenated text of the content, ignoring image parts.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Text(part) => Some(part.text.as_str()),
                    Part::Image(_) => None,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn images(&self) -> Vec<&ImagePart> {
        match self {
            Self::Text(_) => vec![],
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Image(image) => Some(image),
                    Part::Text(_) => None,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<Part>> for MessageContent {
    fn from(value: Vec<Part>) -> Self {
        Self::Parts(value)
    }
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            is_streaming: false,
            is_incomplete: false,
            is_error: false,
        }
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An empty assistant message that tokens are streamed into.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            is_streaming: true,
            ..Self::assistant(String::new())
        }
    }

    /// A terminal message reporting a failed send.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::assistant(text.into())
        }
    }

    #[must_use]
    pub fn has_images(&self) -> bool {
        !self.content.images().is_empty()
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.content.text()
    }
}

impl ContextArtifact {
    pub fn new(
        id: impl Into<String>,
        image_data: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            image_data: image_data.into(),
            mime_type: mime_type.into(),
            score: None,
            doc_id: None,
            page_num: None,
        }
    }

    /// Build an artifact from raw image bytes, e.g. a file picked by the user.
    pub fn from_image_bytes(
        id: impl Into<String>,
        bytes: &[u8],
        mime_type: impl Into<String>,
    ) -> Self {
        Self::new(id, STANDARD.encode(bytes), mime_type)
    }

    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    #[must_use]
    pub fn with_source(mut self, doc_id: impl Into<String>, page_num: u32) -> Self {
        self.doc_id = Some(doc_id.into());
        self.page_num = Some(page_num);
        self
    }
}
