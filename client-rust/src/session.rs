use crate::{
    assembler::{self, ResolvedDirective},
    command::{CommandGrammar, CommandParser, DirectiveSpec, PendingCommand},
    ChatError, ChatResult, ChatSessionOptions, ChatTransport, ConfigError, ContextArtifact,
    ContextStore, Conversation, DocumentRetriever, HttpChatTransport, HttpClientOptions,
    HttpRetriever, Message, Role, StreamError, TokenStream,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};
use tracing_futures::Instrument;

/// Notifications emitted while a send progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    RetrievalStarted { query: String },
    RetrievalFinished { query: String, artifacts: usize },
    MessageAppended { index: usize, role: Role },
    Delta { text: String },
    Completed,
    Cancelled,
    Failed { error: String },
}

/// How a send ended when it was accepted.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The reply finished with the completion sentinel.
    Completed { tokens: usize },
    /// The caller cancelled; partial content was kept.
    Cancelled { tokens: usize },
    /// The reply failed; an error message was appended to the history.
    Failed { error: StreamError },
    /// The input was a directive with no other text. Nothing was sent; the
    /// search results were kept in the context store.
    ContextOnly { context: usize },
}

enum Step {
    Token(String),
    End,
    Error(StreamError),
    Cancelled,
}

/// Finalizes the reply as cancelled when a send future is dropped before the
/// reply reached a terminal state.
struct InFlight<'a> {
    session: &'a mut ChatSession,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.session.conversation.is_processing() {
            warn!("send dropped before the reply finished");
            self.session.conversation.cancel();
            self.session.emit(ChatEvent::Cancelled);
        }
    }
}

/// One conversation with the chat endpoint, including the artifacts
/// attached to the next message.
pub struct ChatSession {
    conversation: Conversation,
    context: ContextStore,
    grammar: Box<dyn CommandGrammar>,
    retriever: Arc<dyn DocumentRetriever>,
    transport: Arc<dyn ChatTransport>,
    options: ChatSessionOptions,
    subscribers: Vec<mpsc::UnboundedSender<ChatEvent>>,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(
        retriever: Arc<dyn DocumentRetriever>,
        transport: Arc<dyn ChatTransport>,
        options: ChatSessionOptions,
    ) -> Self {
        Self {
            conversation: Conversation::new(
                options.system_prompt.clone(),
                options.error_message.clone(),
            ),
            context: ContextStore::new(),
            grammar: Box::new(CommandParser::default()),
            retriever,
            transport,
            options,
            subscribers: vec![],
            last_error: None,
        }
    }

    /// A session talking to the HTTP search and chat endpoints.
    pub fn http(
        http_options: &HttpClientOptions,
        options: ChatSessionOptions,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            Arc::new(HttpRetriever::new(http_options)?),
            Arc::new(HttpChatTransport::new(http_options)?),
            options,
        ))
    }

    #[must_use]
    pub fn with_grammar(mut self, grammar: Box<dyn CommandGrammar>) -> Self {
        self.grammar = grammar;
        self
    }

    /// Receive events for every subsequent send.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.conversation.is_processing()
    }

    /// The reason of the last rejected or failed send.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn parse(&self, raw: &str) -> PendingCommand {
        self.grammar.parse(raw)
    }

    #[must_use]
    pub fn is_command_trigger(&self, raw: &str) -> bool {
        self.grammar.is_command_trigger(raw)
    }

    #[must_use]
    pub fn suggestions(&self, raw: &str) -> Vec<DirectiveSpec> {
        self.grammar.suggestions(raw)
    }

    /// Add artifacts picked by the user to the next message.
    pub fn attach<I>(&mut self, artifacts: I) -> usize
    where
        I: IntoIterator<Item = ContextArtifact>,
    {
        self.context.merge(artifacts)
    }

    pub fn detach(&mut self, id: &str) -> Option<ContextArtifact> {
        self.context.remove(id)
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    /// Drop the history except the system prompt.
    pub fn reset(&mut self) -> ChatResult<()> {
        self.conversation.reset()
    }

    /// Search documents without sending anything. The context store is left
    /// untouched.
    pub async fn search(&mut self, query: &str) -> ChatResult<Vec<ContextArtifact>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::InvalidInput("search query is empty".to_string()));
        }
        let resolved = self.resolve(query).await?;
        Ok(resolved.artifacts)
    }

    /// Send one input. See [`ChatSession::send_with_cancel`].
    pub async fn send(&mut self, input: &str) -> ChatResult<SendOutcome> {
        self.send_with_cancel(input, CancellationToken::new()).await
    }

    /// Parse the input, run its directive search if any, assemble the user
    /// message and stream the reply into the history.
    ///
    /// A failed search rejects the send before anything is appended. Stream
    /// failures are not errors of this call: they end the send with
    /// [`SendOutcome::Failed`] after appending an error message. Cancelling
    /// `cancel` stops reading between chunks and keeps the partial reply.
    /// Dropping the returned future mid-reply has the same effect.
    pub async fn send_with_cancel(
        &mut self,
        input: &str,
        cancel: CancellationToken,
    ) -> ChatResult<SendOutcome> {
        let span = info_span!("docchat.send", input_len = input.len());
        self.send_inner(input, cancel).instrument(span).await
    }

    async fn send_inner(
        &mut self,
        input: &str,
        cancel: CancellationToken,
    ) -> ChatResult<SendOutcome> {
        if self.conversation.is_processing() {
            return Err(ChatError::ConcurrencyViolation(self.conversation.state()));
        }
        self.last_error = None;

        let mut command = self.grammar.parse(input);
        if command.is_partial() {
            // Enter completes an open quote, unless that still yields no
            // directive.
            let closed = self.grammar.parse(&format!("{input}\""));
            if closed.directive.is_some() {
                command = closed;
            }
        }

        let resolved = match command.directive.take() {
            Some(directive) => Some(self.resolve(&directive.query).await?),
            None => None,
        };

        if resolved.is_none() && command.literal_text.trim().is_empty() {
            return Err(ChatError::InvalidInput("message is empty".to_string()));
        }

        let Some(message) =
            assembler::assemble(&command.literal_text, resolved, &mut self.context)
        else {
            return Ok(SendOutcome::ContextOnly {
                context: self.context.len(),
            });
        };

        info!(images = message.content.images().len(), "sending message");
        self.conversation.begin_send(message)?;

        let mut in_flight = InFlight { session: self };
        in_flight.session.stream_reply(&cancel).await
    }

    async fn stream_reply(&mut self, cancel: &CancellationToken) -> ChatResult<SendOutcome> {
        self.emit_appended();
        self.conversation.open_placeholder()?;
        self.emit_appended();

        let request = self.conversation.request_messages();
        let outcome = match self.transport.open(&request).await {
            Ok(tokens) => {
                self.conversation.start_streaming();
                self.consume(tokens, cancel).await
            }
            Err(error) => self.fail(error),
        };

        Ok(outcome)
    }

    async fn resolve(&mut self, query: &str) -> ChatResult<ResolvedDirective> {
        self.emit(ChatEvent::RetrievalStarted {
            query: query.to_string(),
        });

        match self.retriever.search(query, self.options.page_budget).await {
            Ok(artifacts) => {
                info!(query, artifacts = artifacts.len(), "search finished");
                self.emit(ChatEvent::RetrievalFinished {
                    query: query.to_string(),
                    artifacts: artifacts.len(),
                });
                Ok(ResolvedDirective {
                    query: query.to_string(),
                    artifacts,
                })
            }
            Err(error) => {
                warn!(query, kind = ?error.kind(), %error, "search failed");
                self.last_error = Some(error.to_string());
                Err(error.into())
            }
        }
    }

    async fn consume(&mut self, mut tokens: TokenStream, cancel: &CancellationToken) -> SendOutcome {
        let mut count = 0;

        let outcome = loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Cancelled,
                next = tokens.next() => match next {
                    Some(Ok(token)) => Step::Token(token),
                    Some(Err(error)) => Step::Error(error),
                    None => Step::End,
                },
            };

            match step {
                Step::Token(token) => {
                    self.conversation.apply_delta(&token);
                    count += 1;
                    self.emit(ChatEvent::Delta { text: token });
                }
                Step::End => {
                    self.conversation.finish();
                    info!(tokens = count, "reply completed");
                    self.emit(ChatEvent::Completed);
                    break SendOutcome::Completed { tokens: count };
                }
                Step::Cancelled => {
                    self.conversation.cancel();
                    info!(tokens = count, "reply cancelled");
                    self.emit(ChatEvent::Cancelled);
                    break SendOutcome::Cancelled { tokens: count };
                }
                Step::Error(error) => break self.fail(error),
            }
        };

        drop(tokens);
        debug!("reply stream released");
        outcome
    }

    fn fail(&mut self, error: StreamError) -> SendOutcome {
        warn!(kind = ?error.kind(), %error, "reply failed");
        self.conversation.fail();
        self.emit_appended();
        self.last_error = Some(error.to_string());
        self.emit(ChatEvent::Failed {
            error: error.to_string(),
        });
        SendOutcome::Failed { error }
    }

    fn emit_appended(&mut self) {
        if let Some(message) = self.conversation.messages().last() {
            let event = ChatEvent::MessageAppended {
                index: self.conversation.messages().len() - 1,
                role: message.role,
            };
            self.emit(event);
        }
    }

    fn emit(&mut self, event: ChatEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
