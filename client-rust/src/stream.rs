use crate::{
    chat_api::{self, ErrorEvent},
    client_utils, ConfigError, HttpClientOptions, Message, StreamError, StreamResult,
};
use async_stream::try_stream;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client,
};
use std::{
    fmt::Display,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tracing::{debug, debug_span};
use tracing_futures::Instrument;

/// Data payload marking the end of a reply.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Ordered, finite sequence of reply tokens. Ends after the completion
/// sentinel; yields an error on any failure.
pub struct TokenStream(Pin<Box<dyn Stream<Item = StreamResult<String>> + Send>>);

impl TokenStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = StreamResult<String>> + Send + 'static,
    {
        Self(Box::pin(stream))
    }
}

impl Stream for TokenStream {
    type Item = StreamResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}

/// Opens a streamed reply for a conversation.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the full history and return the reply's token stream. Dropping
    /// the stream releases the underlying connection.
    async fn open(&self, messages: &[Message]) -> StreamResult<TokenStream>;
}

/// Chat transport backed by the HTTP event-stream endpoint.
pub struct HttpChatTransport {
    client: Client,
    chat_url: String,
    headers: HeaderMap,
    idle_timeout: Duration,
}

impl HttpChatTransport {
    pub fn new(options: &HttpClientOptions) -> Result<Self, ConfigError> {
        let mut headers =
            client_utils::build_headers(&options.headers).map_err(ConfigError::Header)?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        Ok(Self {
            client: options.build_client()?,
            chat_url: options.endpoint(&options.chat_path),
            headers,
            idle_timeout: options.idle_timeout,
        })
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open(&self, messages: &[Message]) -> StreamResult<TokenStream> {
        let request = chat_api::convert_to_chat_request(messages);
        debug!(messages = request.messages.len(), "opening chat stream");

        let send = self
            .client
            .post(&self.chat_url)
            .headers(self.headers.clone())
            .json(&request)
            .send();

        let response = tokio::time::timeout(self.idle_timeout, send)
            .await
            .map_err(|_| {
                StreamError::Network(format!(
                    "No response within {}s",
                    self.idle_timeout.as_secs()
                ))
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                status: status.as_u16(),
                message: client_utils::error_message(response).await,
            });
        }

        Ok(decode_token_stream(
            response.bytes_stream(),
            Some(self.idle_timeout),
        ))
    }
}

/// A decoded event of the reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Token(String),
    Done,
}

/// Interpret the data of one event. Empty events yield `None`.
pub fn parse_frame(data: &str) -> StreamResult<Option<Frame>> {
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_SENTINEL {
        return Ok(Some(Frame::Done));
    }
    if data.starts_with(r#"{"error""#) {
        let ErrorEvent { error } = serde_json::from_str(data)
            .map_err(|e| StreamError::Decode(format!("Failed to parse error event: {e}")))?;
        return Err(StreamError::ServerSignaled(error));
    }

    Ok(Some(Frame::Token(data.to_string())))
}

/// Decode a raw byte stream of `data: ` events into reply tokens.
///
/// Bytes of a character split across chunks are carried over to the next
/// chunk. The stream must end with the completion sentinel; closing early is
/// a `Network` failure. With `idle_timeout`, a gap between chunks longer than
/// the limit is a `Network` failure as well.
pub fn decode_token_stream<S, B, E>(byte_stream: S, idle_timeout: Option<Duration>) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut events = Box::pin(byte_stream).eventsource();

    let stream = try_stream! {
        loop {
            match next_frame(&mut events, idle_timeout).await? {
                Frame::Token(token) => {
                    yield token;
                }
                Frame::Done => break,
            }
        }
    };

    TokenStream::from_stream(stream.instrument(debug_span!("docchat.stream")))
}

async fn next_frame<S, E>(events: &mut S, idle_timeout: Option<Duration>) -> StreamResult<Frame>
where
    S: Stream<Item = Result<Event, EventStreamError<E>>> + Unpin,
    E: Display,
{
    loop {
        let next = match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, events.next())
                .await
                .map_err(|_| {
                    StreamError::Network(format!("No data received for {}s", limit.as_secs()))
                })?,
            None => events.next().await,
        };

        let Some(event) = next else {
            return Err(StreamError::Network(
                "Stream closed before the completion sentinel".to_string(),
            ));
        };

        let event = event.map_err(map_event_error)?;
        if let Some(frame) = parse_frame(&event.data)? {
            return Ok(frame);
        }
    }
}

fn map_event_error<E: Display>(error: EventStreamError<E>) -> StreamError {
    match error {
        EventStreamError::Utf8(_) => {
            StreamError::Decode("Receive invalid UTF-8 sequence for stream data".to_string())
        }
        EventStreamError::Parser(error) => {
            StreamError::Decode(format!("Receive invalid EventStream data: {error}"))
        }
        EventStreamError::Transport(error) => StreamError::Network(error.to_string()),
    }
}
