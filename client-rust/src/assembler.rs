use crate::{ContextArtifact, ContextStore, ImagePart, Message, Part, TextPart};
use tracing::debug;

/// A directive whose search has completed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDirective {
    pub query: String,
    pub artifacts: Vec<ContextArtifact>,
}

/// Prefix the literal text with a note naming the search that produced the
/// attached images.
#[must_use]
pub fn annotate(query: &str, literal_text: &str) -> String {
    format!("[Context: Searched documents for \"{query}\"] {literal_text}")
}

/// Build the outgoing user message.
///
/// With a resolved directive, the message carries only that search's
/// artifacts. If no literal text remains, nothing is sent and the artifacts
/// are merged into `context` for a later send. Without a directive, the
/// message carries the current context. Whenever a message is produced the
/// context store is emptied, so every image is sent once.
pub fn assemble(
    literal_text: &str,
    resolved: Option<ResolvedDirective>,
    context: &mut ContextStore,
) -> Option<Message> {
    let literal_text = literal_text.trim();

    match resolved {
        Some(ResolvedDirective { query, artifacts }) => {
            if literal_text.is_empty() {
                let merged = context.merge(artifacts);
                debug!(query, merged, "directive-only input, artifacts kept in context");
                return None;
            }
            context.clear();
            Some(user_message(annotate(&query, literal_text), &artifacts))
        }
        None => {
            if literal_text.is_empty() {
                return None;
            }
            let artifacts = context.drain();
            Some(user_message(literal_text.to_string(), &artifacts))
        }
    }
}

/// Plain text content when there are no images, otherwise the text part
/// followed by one image part per artifact.
fn user_message(text: String, artifacts: &[ContextArtifact]) -> Message {
    if artifacts.is_empty() {
        return Message::user(text);
    }

    let parts: Vec<Part> = std::iter::once(Part::Text(TextPart::new(text)))
        .chain(
            artifacts
                .iter()
                .map(|artifact| Part::Image(ImagePart::from(artifact))),
        )
        .collect();

    Message::user(parts)
}
