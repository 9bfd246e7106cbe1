//! Session controller driving request cycles
//!
//! A cycle runs one request to completion: chunks are accumulated, parsed,
//! classified and reconciled into [`SessionState`] one at a time, and the
//! finished buffer is strictly parsed for the thread id. Every method that
//! starts a cycle takes `&mut self`, so cycles on one session never
//! interleave.
//!
//! A cycle that fails or is cancelled restores the state it started from.

use crate::{
    classify::classify,
    client::RecipeClient,
    error::{Error, Result},
    format::FormattedMessage,
    models::{ConversationTurn, Recipe, RecipeRequest, ThreadId},
    parser::PartialParser,
    reconcile::SessionState,
    streaming::{finalize, StreamBuffer},
};
use futures::{Stream, StreamExt};
use std::fmt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, instrument, trace, warn, Instrument};
use uuid::Uuid;

/// Which top-level flow a cycle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Recipe extraction from a URL
    Recipe,
    /// Chat continuation on an existing thread
    Chat,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Recipe => f.write_str("recipe"),
            Flow::Chat => f.write_str("chat"),
        }
    }
}

/// Owns the UI-facing state and runs request cycles against it
pub struct Session {
    client: RecipeClient,
    state: SessionState,
    updates: watch::Sender<SessionState>,
}

impl Session {
    /// Create a session with empty state
    pub fn new(client: RecipeClient) -> Self {
        let (updates, _) = watch::channel(SessionState::default());
        Self {
            client,
            state: SessionState::default(),
            updates,
        }
    }

    /// Create a session with a client configured from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(RecipeClient::from_env()?))
    }

    /// Get the client
    pub fn client(&self) -> &RecipeClient {
        &self.client
    }

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Receive a snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.updates.subscribe()
    }

    /// Recipe shown in the recipe panel
    pub fn current_recipe(&self) -> Option<&Recipe> {
        self.state.recipe.as_ref()
    }

    /// Stored chat turns
    pub fn conversation_turns(&self) -> &[ConversationTurn] {
        &self.state.turns
    }

    /// Chat turns ready to render
    pub fn timeline(&self) -> Vec<FormattedMessage> {
        self.state.timeline()
    }

    /// Whether a cycle is in flight
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming
    }

    /// Thread for chat continuation
    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.state.thread_id.as_ref()
    }

    /// Extract a recipe from `url`, showing it as it streams in
    #[instrument(skip(self, annotations, cancel))]
    pub async fn submit_recipe_url(
        &mut self,
        url: &str,
        annotations: &str,
        cancel: &CancellationToken,
    ) -> Result<ThreadId> {
        let request = RecipeRequest::new(
            url.trim(),
            self.client.config().annotations_for(annotations),
        );
        if request.url.is_empty() {
            return Err(Error::Config("Recipe URL is required".to_string()));
        }

        let prior = self.begin_cycle();
        let client = self.client.clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            opened = client.stream_recipe(&request) => opened,
        };

        self.drive(Flow::Recipe, prior, None, opened, cancel).await
    }

    /// Send a chat message on the current thread, streaming the reply into
    /// a single assistant turn
    #[instrument(skip(self, text, cancel))]
    pub async fn send_chat_message(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ThreadId> {
        let message = text.trim();
        if message.is_empty() {
            return Err(Error::Config("Chat message is required".to_string()));
        }
        let thread_id = self.state.thread_id.clone().ok_or(Error::MissingThread)?;

        let prior = self.begin_cycle();
        let reply = self.state.begin_chat(message);
        self.publish();

        let client = self.client.clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            opened = client.stream_chat(&thread_id, message) => opened,
        };

        self.drive(Flow::Chat, prior, Some(reply), opened, cancel).await
    }

    /// Run a recipe cycle over an already opened chunk source
    pub async fn consume_recipe_stream<S>(
        &mut self,
        chunks: S,
        cancel: &CancellationToken,
    ) -> Result<ThreadId>
    where
        S: Stream<Item = Result<String>>,
    {
        let prior = self.begin_cycle();
        self.drive(Flow::Recipe, prior, None, Ok(chunks), cancel).await
    }

    /// Run a chat cycle for `message` over an already opened chunk source
    pub async fn consume_chat_stream<S>(
        &mut self,
        message: &str,
        chunks: S,
        cancel: &CancellationToken,
    ) -> Result<ThreadId>
    where
        S: Stream<Item = Result<String>>,
    {
        let prior = self.begin_cycle();
        let reply = self.state.begin_chat(message);
        self.publish();
        self.drive(Flow::Chat, prior, Some(reply), Ok(chunks), cancel).await
    }

    /// Replace the turn list with the backend's stored history
    #[cfg(feature = "history")]
    #[cfg_attr(docsrs, doc(cfg(feature = "history")))]
    pub async fn load_history(&mut self) -> Result<()> {
        let thread_id = self.state.thread_id.clone().ok_or(Error::MissingThread)?;
        let history = self.client.chat_history(&thread_id).await?;

        debug!(turns = history.history.len(), "Loaded chat history");
        self.state.turns = history.history;
        self.publish();
        Ok(())
    }

    fn begin_cycle(&mut self) -> SessionState {
        let prior = self.state.clone();
        self.state.error = None;
        self.state.is_streaming = true;
        self.publish();
        prior
    }

    async fn drive<S>(
        &mut self,
        flow: Flow,
        prior: SessionState,
        reply: Option<usize>,
        opened: Result<S>,
        cancel: &CancellationToken,
    ) -> Result<ThreadId>
    where
        S: Stream<Item = Result<String>>,
    {
        let span = info_span!("cycle", id = %Uuid::new_v4(), %flow);

        let outcome = match opened {
            Ok(chunks) => self.consume(chunks, reply, cancel).instrument(span).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(thread_id) => {
                self.state.thread_id = Some(thread_id.clone());
                self.state.is_streaming = false;
                self.publish();
                Ok(thread_id)
            }
            Err(e) => {
                self.abort(prior, &e);
                Err(e)
            }
        }
    }

    async fn consume<S>(
        &mut self,
        chunks: S,
        mut reply: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<ThreadId>
    where
        S: Stream<Item = Result<String>>,
    {
        let mut chunks = std::pin::pin!(chunks);
        let mut buffer = StreamBuffer::new();
        let mut parser = PartialParser::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = chunks.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };

            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            buffer.append(&chunk);

            let classification = classify(parser.parse(buffer.as_str()));
            let update = self.state.reconcile(&classification, &mut reply);
            trace!(
                chunk = buffer.chunks(),
                bytes = buffer.len(),
                kind = ?classification.kind(),
                ?update,
                "Chunk reconciled"
            );
            if update.changed() {
                self.publish();
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let finalized = finalize(&buffer)?;
        // End state comes from the strict value, never from chunk boundaries.
        self.state
            .reconcile(&classify(Some(&finalized.envelope)), &mut reply);

        debug!(
            chunks = buffer.chunks(),
            bytes = buffer.len(),
            rejected = parser.rejected(),
            thread_id = %finalized.thread_id,
            "Stream finished"
        );
        Ok(finalized.thread_id)
    }

    fn abort(&mut self, prior: SessionState, error: &Error) {
        self.state = prior;
        self.state.is_streaming = false;
        self.state.error = match error {
            Error::Cancelled => {
                debug!("Cycle cancelled, state restored");
                None
            }
            e => {
                warn!("Cycle failed, state restored: {}", e);
                Some(e.to_string())
            }
        };
        self.publish();
    }

    fn publish(&self) {
        self.updates.send_replace(self.state.clone());
    }
}
