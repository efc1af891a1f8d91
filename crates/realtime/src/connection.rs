//! One physical duplex socket.
//!
//! The socket is owned by a driver task; a [`Connection`] is a cheap handle
//! that queues outbound frames, registers the inbound observers and requests
//! the close handshake.

use crate::error::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, protocol::Message},
};
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type MessageHandler = Box<dyn FnMut(Frame) + Send>;
type ErrorHandler = Box<dyn FnMut(Error) + Send>;
type CloseHandler = Box<dyn FnOnce() + Send>;

const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A discrete message exchanged over the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress. Handles only exist once it succeeds.
    Connecting,
    Open,
    Closing,
    Closed,
}

enum Command {
    Send(Message),
    Close,
}

#[derive(Default)]
struct Handlers {
    on_message: Option<MessageHandler>,
    on_error: Option<ErrorHandler>,
    on_close: Option<CloseHandler>,
    closed: bool,
}

#[derive(Clone, Default)]
struct SharedHandlers(Arc<Mutex<Handlers>>);

impl SharedHandlers {
    fn lock(&self) -> std::sync::MutexGuard<'_, Handlers> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Handlers run outside the lock so they may re-register themselves.
    fn message(&self, frame: Frame) {
        let handler = self.lock().on_message.take();
        match handler {
            Some(mut handler) => {
                handler(frame);
                let mut handlers = self.lock();
                if handlers.on_message.is_none() {
                    handlers.on_message = Some(handler);
                }
            }
            None => debug!("No message observer registered, dropping frame"),
        }
    }

    fn error(&self, err: Error) {
        let handler = self.lock().on_error.take();
        match handler {
            Some(mut handler) => {
                handler(err);
                let mut handlers = self.lock();
                if handlers.on_error.is_none() {
                    handlers.on_error = Some(handler);
                }
            }
            None => error!("Unobserved websocket error: {}", err),
        }
    }

    fn closed(&self) {
        let handler = {
            let mut handlers = self.lock();
            handlers.closed = true;
            handlers.on_message = None;
            handlers.on_error = None;
            handlers.on_close.take()
        };
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// Handle to one duplex socket.
#[derive(Clone)]
pub struct Connection {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    close_result: watch::Receiver<Option<Result<()>>>,
    handlers: SharedHandlers,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Connection {
    /// Establishes the socket. Fails with [`Error::Connect`] if the handshake
    /// errors before the socket is open.
    pub async fn open(url: &str) -> Result<Self> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| Error::Connect(Arc::new(e)))?;

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        info!(connection = id, "Websocket connected");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Open);
        let (close_tx, close_rx) = watch::channel(None);
        let handlers = SharedHandlers::default();

        tokio::spawn(drive(
            id,
            socket,
            command_rx,
            state_tx,
            close_tx,
            handlers.clone(),
        ));

        Ok(Self {
            id,
            commands: command_tx,
            state: state_rx,
            close_result: close_rx,
            handlers,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Open and still accepting frames. The driver stops accepting before it
    /// publishes [`ConnectionState::Closed`].
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && !self.commands.is_closed()
    }

    /// A handle whose driver is already gone but whose last published state
    /// is still `Open`, as seen right after an unnoticed drop.
    #[cfg(test)]
    pub(crate) fn dead() -> Self {
        let (commands, _) = mpsc::unbounded_channel();
        let (_, state) = watch::channel(ConnectionState::Open);
        let (_, close_result) = watch::channel(None);
        Self {
            id: 0,
            commands,
            state,
            close_result,
            handlers: SharedHandlers::default(),
        }
    }

    /// Queues a frame for transmission.
    ///
    /// Only fails once the driver has stopped accepting frames.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<()> {
        self.commands
            .send(Command::Send(frame.into().into()))
            .map_err(|_| Error::AlreadyClosed)
    }

    /// Registers the inbound frame observer, replacing any previous one.
    pub fn on_message(&self, handler: impl FnMut(Frame) + Send + 'static) {
        let mut handlers = self.handlers.lock();
        if !handlers.closed {
            handlers.on_message = Some(Box::new(handler));
        }
    }

    /// Registers the observer for non-fatal transport errors.
    pub fn on_error(&self, handler: impl FnMut(Error) + Send + 'static) {
        let mut handlers = self.handlers.lock();
        if !handlers.closed {
            handlers.on_error = Some(Box::new(handler));
        }
    }

    /// Registers the callback run exactly once when the socket reaches
    /// [`ConnectionState::Closed`]. Runs immediately if it already has.
    pub fn on_close(&self, handler: impl FnOnce() + Send + 'static) {
        let mut handlers = self.handlers.lock();
        if handlers.closed {
            drop(handlers);
            handler();
        } else {
            handlers.on_close = Some(Box::new(handler));
        }
    }

    /// Performs the close handshake. Idempotent: every caller observes the
    /// outcome of the first request.
    pub async fn close(&self) -> Result<()> {
        // Ignored by the driver once it has started closing.
        let _ = self.commands.send(Command::Close);
        self.closed().await
    }

    /// Waits for the socket to close, by whichever side.
    pub async fn closed(&self) -> Result<()> {
        let mut close_result = self.close_result.clone();
        match close_result.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            Err(_) => Ok(()),
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame::Binary(bytes)
    }
}

fn is_normal_termination(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
    )
}

fn to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.to_string())),
        Message::Binary(bytes) => Some(Frame::Binary(bytes.to_vec())),
        _ => None,
    }
}

async fn drive(
    id: u64,
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    close_result: watch::Sender<Option<Result<()>>>,
    handlers: SharedHandlers,
) {
    let (mut sink, mut stream) = socket.split();

    let outcome = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if let Err(e) = sink.send(message).await {
                        if !is_normal_termination(&e) {
                            handlers.error(Error::Runtime(Arc::new(e)));
                        }
                        break Ok(());
                    }
                }
                Some(Command::Close) | None => {
                    state.send_replace(ConnectionState::Closing);
                    info!(connection = id, "Closing websocket");
                    break close_handshake(id, &mut sink, &mut stream, &handlers).await;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Close(frame))) => {
                    // tungstenite queues the reply; the next read flushes it
                    info!(connection = id, ?frame, "Websocket closed by remote");
                    state.send_replace(ConnectionState::Closing);
                }
                Some(Ok(message)) => {
                    if let Some(frame) = to_frame(message) {
                        handlers.message(frame);
                    }
                }
                Some(Err(e)) if is_normal_termination(&e) => break Ok(()),
                Some(Err(e)) => {
                    error!(connection = id, "Websocket read failed: {}", e);
                    handlers.error(Error::Runtime(Arc::new(e)));
                    break Ok(());
                }
                None => break Ok(()),
            },
        }
    };

    // Reject further sends before observers learn about the close.
    commands.close();
    drop(commands);

    state.send_replace(ConnectionState::Closed);
    close_result.send_replace(Some(outcome));
    info!(connection = id, "Websocket closed");
    handlers.closed();
}

async fn close_handshake(
    id: u64,
    sink: &mut futures_util::stream::SplitSink<Socket, Message>,
    stream: &mut futures_util::stream::SplitStream<Socket>,
    handlers: &SharedHandlers,
) -> Result<()> {
    if let Err(e) = sink.send(Message::Close(None)).await {
        return if is_normal_termination(&e) {
            Ok(())
        } else {
            Err(Error::Close(Arc::new(e)))
        };
    }

    let drain = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(message) => {
                    if let Some(frame) = to_frame(message) {
                        handlers.message(frame);
                    }
                }
                Err(e) if is_normal_termination(&e) => return Ok(()),
                Err(e) => return Err(Error::Close(Arc::new(e))),
            }
        }
        Ok(())
    };

    match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(connection = id, "Close handshake timed out");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(message)) = ws.next().await {
                        if message.is_text() || message.is_binary() {
                            let _ = ws.send(message).await;
                        }
                    }
                });
            }
        });
        format!("ws://{addr}")
    }

    #[test]
    fn test_dead_handle_is_not_open() {
        let connection = Connection::dead();
        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(!connection.is_open());
        assert!(matches!(connection.send("x"), Err(Error::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_connect_error() {
        let err = Connection::open("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let url = echo_server().await;
        let connection = Connection::open(&url).await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(connection.is_open());

        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.on_message(move |frame| {
            let _ = tx.send(frame);
        });

        connection.send("ping").unwrap();
        connection.send(vec![1u8, 2, 3]).unwrap();
        assert_eq!(rx.recv().await, Some(Frame::Text("ping".into())));
        assert_eq!(rx.recv().await, Some(Frame::Binary(vec![1, 2, 3])));

        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_fires_on_close_once() {
        let url = echo_server().await;
        let connection = Connection::open(&url).await.unwrap();

        let count = Arc::new(AtomicU64::new(0));
        let observed = count.clone();
        connection.on_close(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        let (first, second) = tokio::join!(connection.close(), connection.close());
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(connection.close().await.is_ok());
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(!connection.is_open());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(matches!(
            connection.send("late"),
            Err(Error::AlreadyClosed)
        ));

        // Registering after the fact runs immediately.
        let late = count.clone();
        connection.on_close(move || {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
