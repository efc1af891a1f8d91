//! Scripted in-process stand-in for the synthesis socket.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use neuphonic_core::audio::encode_base64_audio;
use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

static TRACING: OnceLock<()> = OnceLock::new();

pub fn init_tracing() {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt().with_env_filter("warn").init();
    });
}

/// What the server does in response to one inbound text frame.
#[derive(Debug, Clone)]
pub enum Action {
    Frame(String),
    Delay(Duration),
    /// Close the socket and stop serving this connection.
    Close,
}

pub fn frame(text: &str, stop: bool) -> String {
    serde_json::json!({
        "data": {
            "audio": encode_base64_audio(text.as_bytes()),
            "text": text,
            "sampling_rate": 22050,
            "stop": stop,
        }
    })
    .to_string()
}

/// Two frames, `"{text}:0"` then the stop frame `"{text}:1"`.
pub fn reply(text: &str) -> Vec<Action> {
    vec![
        Action::Frame(frame(&format!("{text}:0"), false)),
        Action::Frame(frame(&format!("{text}:1"), true)),
    ]
}

pub struct FakeServer {
    pub url: String,
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

pub async fn serve<F>(script: F) -> anyhow::Result<FakeServer>
where
    F: Fn(&str) -> Vec<Action> + Send + Sync + 'static,
{
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let listener = TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;

    let script = Arc::new(script);
    let accepted = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(Mutex::new(Vec::new()));

    tokio::spawn({
        let accepted = accepted.clone();
        let received = received.clone();
        async move {
            while let Ok((tcp, _peer)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                let received = received.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle(tcp, script, received).await {
                        tracing::debug!("fake server connection ended: {e}");
                    }
                });
            }
        }
    });

    Ok(FakeServer {
        url: format!("ws://{}:{}", bound.ip(), bound.port()),
        addr: bound,
        accepted,
        received,
    })
}

async fn handle<F>(
    tcp: TcpStream,
    script: Arc<F>,
    received: Arc<Mutex<Vec<String>>>,
) -> anyhow::Result<()>
where
    F: Fn(&str) -> Vec<Action> + Send + Sync + 'static,
{
    let mut ws = accept_async(tcp).await?;
    while let Some(message) = ws.next().await {
        let message = message?;
        if !message.is_text() {
            continue;
        }
        let text = message.to_text()?.to_string();
        received.lock().unwrap().push(text.clone());

        for action in script(&text) {
            match action {
                Action::Frame(frame) => ws.send(Message::Text(frame.into())).await?,
                Action::Delay(delay) => tokio::time::sleep(delay).await,
                Action::Close => {
                    ws.close(None).await?;
                    while let Some(Ok(_)) = ws.next().await {}
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}
