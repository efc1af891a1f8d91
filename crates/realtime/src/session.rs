//! Request/response correlation over a [`Connection`].
//!
//! The wire protocol carries no request id. Responses are attributed strictly
//! in issue order: every inbound frame belongs to the oldest request that has
//! not yet seen its stop chunk. A server that interleaves or reorders the
//! responses of concurrent requests will have its chunks misattributed.

use crate::{
    connection::{Connection, Frame},
    error::{Error, Result},
    protocol::{Chunk, STOP_SENTINEL, SynthesizedAudio},
};
use futures::{Stream, StreamExt, future::join_all};
use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, Weak},
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::{OnceCell, mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// How many requests may be outstanding on one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlightPolicy {
    /// A second send fails with [`Error::StillReceiving`] until the first
    /// response has stopped.
    Single,
    /// Sends are queued and answered in issue order.
    #[default]
    Multi,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub policy: FlightPolicy,
    pub base_timeout: Duration,
    pub per_char_timeout: Duration,
    pub max_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: FlightPolicy::Multi,
            base_timeout: Duration::from_millis(3000),
            per_char_timeout: Duration::from_millis(10),
            max_timeout: Duration::from_millis(900_000),
        }
    }
}

impl SessionConfig {
    /// How long a request of `text` may wait for its stop chunk.
    pub fn response_timeout(&self, text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        self.per_char_timeout
            .saturating_mul(chars)
            .saturating_add(self.base_timeout)
            .min(self.max_timeout)
    }
}

/// `min(10 ms × len + 3000 ms, 900000 ms)`.
pub fn response_timeout(text: &str) -> Duration {
    SessionConfig::default().response_timeout(text)
}

/// Resolves once a request has finished, `true` only if its stop chunk
/// arrived.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<bool>>,
}

impl Completion {
    pub async fn wait(&self) -> bool {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// The outcome, if already known.
    pub fn outcome(&self) -> Option<bool> {
        *self.rx.borrow()
    }
}

/// The chunks of one request, in arrival order.
///
/// Ends after the stop chunk, or early when the request is abandoned, times
/// out or is stopped; [`Speech::completion`] tells which.
#[derive(Debug)]
pub struct Speech {
    chunks: UnboundedReceiverStream<Chunk>,
    completion: Completion,
}

impl Speech {
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Drains the remaining chunks into one buffer.
    pub async fn collect_audio(self) -> SynthesizedAudio {
        let chunks: Vec<Chunk> = self.collect().await;
        SynthesizedAudio::from_chunks(&chunks)
    }
}

impl Stream for Speech {
    type Item = Chunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        Pin::new(&mut self.get_mut().chunks).poll_next(cx)
    }
}

struct PendingRequest {
    id: u64,
    /// Connection the request was sent on.
    generation: u64,
    /// `None` once the caller stopped listening.
    chunks: Option<mpsc::UnboundedSender<Chunk>>,
    completion: watch::Sender<Option<bool>>,
    timer: Option<JoinHandle<()>>,
}

impl PendingRequest {
    fn deliver(&mut self, chunk: Chunk) {
        if let Some(chunks) = &self.chunks {
            if chunks.send(chunk).is_err() {
                debug!(request = self.id, "Speech dropped by caller");
                self.chunks = None;
            }
        }
    }

    fn resolve(&self, completed: bool) {
        self.completion.send_if_modified(|outcome| {
            if outcome.is_none() {
                *outcome = Some(completed);
                true
            } else {
                false
            }
        });
    }

    /// Ends the caller's stream; the request itself stays queued.
    fn detach(&mut self) {
        self.chunks = None;
        self.resolve(false);
    }

    fn finish(mut self, completed: bool) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.chunks = None;
        self.resolve(completed);
    }
}

#[derive(Default)]
struct State {
    connection: Option<Connection>,
    generation: u64,
    next_request: u64,
    pending: VecDeque<PendingRequest>,
    closed: bool,
}

struct Inner {
    url: String,
    config: SessionConfig,
    state: Mutex<State>,
    /// Serializes send, reconnect and close.
    gate: tokio::sync::Mutex<()>,
    close_result: OnceCell<Result<()>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the open connection, opening a fresh one after a drop.
    async fn ensure_connected(self: &Arc<Self>) -> Result<(Connection, u64)> {
        let current = {
            let state = self.lock();
            state
                .connection
                .clone()
                .map(|connection| (connection, state.generation))
        };
        if let Some((connection, generation)) = current {
            if connection.is_open() {
                return Ok((connection, generation));
            }
            // Remote close under way; let it finish before replacing it.
            let _ = connection.closed().await;
        }

        let connection = Connection::open(&self.url).await?;
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.connection = Some(connection.clone());
            state.generation
        };
        debug!(connection = connection.id(), generation, "Session attached");

        let weak = Arc::downgrade(self);
        connection.on_message(move |frame| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_frame(generation, frame);
            }
        });
        connection.on_error(|err| warn!("Session transport error: {}", err));
        let weak = Arc::downgrade(self);
        connection.on_close(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_close(generation);
            }
        });

        Ok((connection, generation))
    }

    fn handle_frame(&self, generation: u64, frame: Frame) {
        let raw = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Dropping non UTF-8 binary frame");
                    return;
                }
            },
        };
        let chunk = match Chunk::decode(&raw) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return;
            }
        };

        let finished = {
            let mut state = self.lock();
            let Some(head) = state.pending.front_mut() else {
                debug!("Dropping frame with no request waiting for it");
                return;
            };
            if head.generation != generation {
                debug!(generation, "Dropping frame from a previous connection");
                return;
            }
            let stop = chunk.stop;
            head.deliver(chunk);
            if stop { state.pending.pop_front() } else { None }
        };

        if let Some(request) = finished {
            debug!(request = request.id, "Response complete");
            request.finish(true);
        }
    }

    fn handle_close(&self, generation: u64) {
        let abandoned = {
            let mut state = self.lock();
            if state.generation == generation {
                state.connection = None;
            }
            let (abandoned, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|request| request.generation == generation);
            state.pending = kept;
            abandoned
        };

        if abandoned.is_empty() {
            info!(generation, "Connection dropped while idle");
        } else {
            warn!(
                generation,
                abandoned = abandoned.len(),
                "Connection dropped with requests in flight"
            );
        }
        for request in abandoned {
            request.finish(false);
        }
    }

    /// Gives up on a request without dequeuing it. Its frames may still
    /// arrive and must not be attributed to the requests behind it, so the
    /// placeholder drains until its stop frame or the end of its connection.
    fn expire(&self, id: u64) {
        let mut state = self.lock();
        if let Some(request) = state.pending.iter_mut().find(|request| request.id == id) {
            warn!(request = id, "No response before the timeout");
            // The timer is the running task; nothing to abort.
            request.timer = None;
            request.detach();
        }
    }

    /// Queues a placeholder and arms its timer. Runs before transmission so
    /// a fast reply always finds its request.
    fn enqueue(self: &Arc<Self>, generation: u64, timeout: Duration) -> (u64, Speech) {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = watch::channel(None);

        let mut state = self.lock();
        state.next_request += 1;
        let id = state.next_request;
        let weak: Weak<Inner> = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(id);
            }
        });
        state.pending.push_back(PendingRequest {
            id,
            generation,
            chunks: Some(chunk_tx),
            completion: completion_tx,
            timer: Some(timer),
        });

        let speech = Speech {
            chunks: UnboundedReceiverStream::new(chunk_rx),
            completion: Completion { rx: completion_rx },
        };
        (id, speech)
    }

    fn remove(&self, id: u64) {
        let removed = {
            let mut state = self.lock();
            let position = state.pending.iter().position(|request| request.id == id);
            position.and_then(|position| state.pending.remove(position))
        };
        if let Some(request) = removed {
            request.finish(false);
        }
    }
}

/// A persistent duplex synthesis session.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct SpeechSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SpeechSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSession")
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}

impl SpeechSession {
    /// Opens the session and its first connection.
    pub async fn open(url: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let inner = Arc::new(Inner {
            url: url.into(),
            config,
            state: Mutex::new(State::default()),
            gate: tokio::sync::Mutex::new(()),
            close_result: OnceCell::new(),
        });
        {
            let _gate = inner.gate.lock().await;
            inner.ensure_connected().await?;
        }
        Ok(Self { inner })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Number of requests still waiting for their stop chunk, including
    /// stopped or timed out ones whose response is still draining.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Sends `text` and returns the stream of its response.
    ///
    /// Reconnects first if the previous connection was dropped. A request
    /// that times out is not an error here; it surfaces through
    /// [`Speech::completion`].
    pub async fn send(&self, text: impl Into<String>) -> Result<Speech> {
        let text = text.into();
        let _gate = self.inner.gate.lock().await;
        {
            let state = self.inner.lock();
            if state.closed {
                return Err(Error::AlreadyClosed);
            }
            if self.inner.config.policy == FlightPolicy::Single && !state.pending.is_empty() {
                return Err(Error::StillReceiving);
            }
        }

        let timeout = self.inner.config.response_timeout(&text);
        let mut reconnected = false;
        loop {
            let (connection, generation) = self.inner.ensure_connected().await?;
            let (id, speech) = self.inner.enqueue(generation, timeout);

            debug!(request = id, chars = text.len(), ?timeout, "Sending text");
            match connection.send(Frame::Text(text.clone())) {
                Ok(()) => return Ok(speech),
                Err(e) => {
                    self.inner.remove(id);
                    // The socket died after it was checked; that is a drop,
                    // not a closed session.
                    if reconnected || self.is_closed() {
                        return Err(e);
                    }
                    debug!(request = id, "Connection lost before sending, reconnecting");
                    reconnected = true;
                }
            }
        }
    }

    /// Sends `text` followed by the stop sentinel, forcing the server to
    /// complete the response.
    pub async fn send_with_stop(&self, text: &str) -> Result<Speech> {
        self.send(format!("{text}{STOP_SENTINEL}")).await
    }

    /// Sends `text` and waits for the whole response.
    pub async fn speak(&self, text: impl Into<String>) -> Result<SynthesizedAudio> {
        Ok(self.send(text).await?.collect_audio().await)
    }

    /// Stops delivering to every outstanding [`Speech`] without closing.
    ///
    /// Their completions resolve to `false`. The requests keep their place in
    /// the queue until the server finishes them, so later responses are still
    /// attributed correctly.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        for request in state.pending.iter_mut() {
            request.detach();
        }
        debug!(detached = state.pending.len(), "Session stopped");
    }

    /// Resolves `true` iff every request outstanding at the time of the call
    /// completes normally. The set is captured before the future is polled.
    pub fn wait(&self) -> impl Future<Output = bool> + Send + 'static {
        let completions: Vec<Completion> = {
            let state = self.inner.lock();
            state
                .pending
                .iter()
                .map(|request| Completion {
                    rx: request.completion.subscribe(),
                })
                .collect()
        };
        async move {
            join_all(completions.iter().map(Completion::wait))
                .await
                .into_iter()
                .all(|completed| completed)
        }
    }

    /// Closes the session for good, abandoning all outstanding requests.
    ///
    /// Idempotent: every call returns the outcome of the first.
    pub async fn close(&self) -> Result<()> {
        self.inner
            .close_result
            .get_or_init(|| async {
                let _gate = self.inner.gate.lock().await;
                let (connection, abandoned) = {
                    let mut state = self.inner.lock();
                    state.closed = true;
                    (
                        state.connection.take(),
                        std::mem::take(&mut state.pending),
                    )
                };
                for request in abandoned {
                    request.finish(false);
                }
                info!("Session closed");
                match connection {
                    Some(connection) => connection.close().await,
                    None => Ok(()),
                }
            })
            .await
            .clone()
    }
}
