use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use futures::{stream, StreamExt};

use crate::{
    errors::{RetrievalError, RetrievalResult, StreamError, StreamResult},
    retrieval::DocumentRetriever,
    stream::{ChatTransport, TokenStream},
    ContextArtifact, Message,
};

/// Result for a mocked `search` call.
pub enum MockSearchResult {
    Artifacts(Vec<ContextArtifact>),
    Error(RetrievalError),
}

impl From<Vec<ContextArtifact>> for MockSearchResult {
    fn from(artifacts: Vec<ContextArtifact>) -> Self {
        Self::Artifacts(artifacts)
    }
}

impl From<RetrievalError> for MockSearchResult {
    fn from(error: RetrievalError) -> Self {
        Self::Error(error)
    }
}

/// A search call recorded by [`MockRetriever`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSearch {
    pub query: String,
    pub page_budget: u32,
}

/// A retriever for testing that tracks queries and yields predefined results.
#[derive(Default)]
pub struct MockRetriever {
    results: Mutex<VecDeque<MockSearchResult>>,
    tracked: Mutex<Vec<TrackedSearch>>,
}

impl MockRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a single mocked search result.
    pub fn enqueue<R>(&self, result: R) -> &Self
    where
        R: Into<MockSearchResult>,
    {
        self.results
            .lock()
            .expect("mock state poisoned")
            .push_back(result.into());
        self
    }

    /// Retrieve the searches made so far.
    pub fn tracked_searches(&self) -> Vec<TrackedSearch> {
        self.tracked.lock().expect("mock state poisoned").clone()
    }
}

#[async_trait::async_trait]
impl DocumentRetriever for MockRetriever {
    async fn search(
        &self,
        query: &str,
        page_budget: u32,
    ) -> RetrievalResult<Vec<ContextArtifact>> {
        self.tracked
            .lock()
            .expect("mock state poisoned")
            .push(TrackedSearch {
                query: query.to_string(),
                page_budget,
            });

        let result = self
            .results
            .lock()
            .expect("mock state poisoned")
            .pop_front()
            .ok_or_else(|| RetrievalError::Network("no mocked search results available".into()))?;

        match result {
            MockSearchResult::Artifacts(artifacts) => Ok(artifacts),
            MockSearchResult::Error(error) => Err(error),
        }
    }
}

/// Result for a mocked `open` call.
pub enum MockStreamResult {
    /// Yield the items in order, then end as if the sentinel arrived.
    Items(Vec<StreamResult<String>>),
    /// Yield the tokens, then wait forever without ending.
    Stalled(Vec<String>),
    /// Fail to open.
    Error(StreamError),
}

impl MockStreamResult {
    /// A reply made of the given tokens that completes normally.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Items(tokens.into_iter().map(|t| Ok(t.into())).collect())
    }
}

impl From<StreamError> for MockStreamResult {
    fn from(error: StreamError) -> Self {
        Self::Error(error)
    }
}

/// Counts opened streams once they are dropped.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A chat transport for testing that tracks requests and yields predefined
/// streams.
#[derive(Default)]
pub struct MockChatTransport {
    results: Mutex<VecDeque<MockStreamResult>>,
    tracked: Mutex<Vec<Vec<Message>>>,
    released: Arc<AtomicUsize>,
}

impl MockChatTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a single mocked stream result.
    pub fn enqueue<R>(&self, result: R) -> &Self
    where
        R: Into<MockStreamResult>,
    {
        self.results
            .lock()
            .expect("mock state poisoned")
            .push_back(result.into());
        self
    }

    /// Retrieve the histories sent so far.
    pub fn tracked_requests(&self) -> Vec<Vec<Message>> {
        self.tracked.lock().expect("mock state poisoned").clone()
    }

    /// Number of opened streams that have been dropped.
    pub fn released_streams(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatTransport for MockChatTransport {
    async fn open(&self, messages: &[Message]) -> StreamResult<TokenStream> {
        self.tracked
            .lock()
            .expect("mock state poisoned")
            .push(messages.to_vec());

        let result = self
            .results
            .lock()
            .expect("mock state poisoned")
            .pop_front()
            .ok_or_else(|| StreamError::Network("no mocked stream results available".into()))?;

        let stream = match result {
            MockStreamResult::Error(error) => return Err(error),
            MockStreamResult::Items(items) => stream::iter(items).boxed(),
            MockStreamResult::Stalled(tokens) => stream::iter(tokens.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
        };
        let guard = ReleaseGuard(self.released.clone());

        Ok(TokenStream::from_stream(stream.map(move |item| {
            let _guard = &guard;
            item
        })))
    }
}
