use crate::{ChatError, ChatResult, Message, MessageContent, Role};
use tracing::{debug, warn};

/// Lifecycle of one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    /// A user message was appended and the reply is being requested.
    Sending,
    /// Reply tokens are being applied to the placeholder.
    Streaming,
}

/// How a streamed reply ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Completed,
    Cancelled,
    Failed,
}

/// Ordered message history plus the single live assistant placeholder.
///
/// The system prompt is the permanent first message. Historical messages are
/// never edited; only the placeholder of the current send changes, and only
/// while it is streaming.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    state: ConversationState,
    error_message: String,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt.into())],
            state: ConversationState::Idle,
            error_message: error_message.into(),
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// True for the whole span between accepting a message and the terminal
    /// state of its reply.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.state != ConversationState::Idle
    }

    /// The message currently receiving tokens, if any.
    #[must_use]
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_streaming)
    }

    /// Accept a user message. Rejected without any change unless idle.
    pub fn begin_send(&mut self, message: Message) -> ChatResult<()> {
        self.ensure_idle()?;
        self.messages.push(message);
        self.state = ConversationState::Sending;
        Ok(())
    }

    /// Append the assistant placeholder the reply is streamed into.
    pub fn open_placeholder(&mut self) -> ChatResult<()> {
        if self.state != ConversationState::Sending {
            return Err(ChatError::ConcurrencyViolation(self.state));
        }
        self.messages.push(Message::placeholder());
        Ok(())
    }

    /// The transport accepted the request; tokens may now arrive.
    pub fn start_streaming(&mut self) {
        if self.state == ConversationState::Sending {
            self.state = ConversationState::Streaming;
        }
    }

    /// Append a token to the placeholder. Ignored once the placeholder is
    /// finalized.
    pub fn apply_delta(&mut self, token: &str) {
        let Some(message) = self.messages.last_mut().filter(|m| m.is_streaming) else {
            warn!("received a token with no streaming message");
            return;
        };

        match &mut message.content {
            MessageContent::Text(text) => text.push_str(token),
            MessageContent::Parts(_) => {
                warn!("streaming message has part content, token dropped");
            }
        }
    }

    /// The reply completed normally.
    pub fn finish(&mut self) {
        self.finalize(Termination::Completed);
    }

    /// The caller cancelled the reply. Partial content is kept and no error
    /// message is added.
    pub fn cancel(&mut self) {
        self.finalize(Termination::Cancelled);
    }

    /// The reply failed. Partial content is kept and exactly one error
    /// message is appended.
    pub fn fail(&mut self) {
        self.finalize(Termination::Failed);
    }

    fn finalize(&mut self, termination: Termination) {
        if self.state == ConversationState::Idle {
            return;
        }

        if let Some(message) = self.messages.last_mut().filter(|m| m.is_streaming) {
            message.is_streaming = false;
            message.is_incomplete = termination != Termination::Completed;
        }

        if termination == Termination::Failed {
            self.messages.push(Message::error(self.error_message.clone()));
        }

        debug!(?termination, messages = self.messages.len(), "send finished");
        self.state = ConversationState::Idle;
    }

    /// Drop every message except the system prompt.
    pub fn reset(&mut self) -> ChatResult<()> {
        self.ensure_idle()?;
        self.messages.truncate(1);
        Ok(())
    }

    /// History sent with a request: everything up to the current user
    /// message, without the placeholder, error messages or empty replies.
    #[must_use]
    pub fn request_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_streaming && !m.is_error)
            .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
            .cloned()
            .collect()
    }

    /// The most recent user message.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    fn ensure_idle(&self) -> ChatResult<()> {
        if self.state == ConversationState::Idle {
            Ok(())
        } else {
            Err(ChatError::ConcurrencyViolation(self.state))
        }
    }
}
