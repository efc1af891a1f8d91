//! Duplex socket to a hosted conversational agent.

use crate::{
    connection::{Connection, ConnectionState, Frame},
    error::{Error, Result},
};
use bytes::Bytes;
use neuphonic_core::{
    ClientConfig, TtsConfig, audio,
    models::query_pairs_from,
    transport::{Protocol, build_auth_url},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Which agent to talk to and how audio is exchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    pub agent_id: String,
    /// Defaults to `bytes`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_sampling_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incoming_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_encoding: Option<String>,
}

impl AgentConfig {
    pub const DEFAULT_INCOMING_MODE: &'static str = "bytes";

    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            incoming_mode: None,
            return_sampling_rate: None,
            incoming_encoding: None,
            return_encoding: None,
        }
    }

    fn query_pairs(&self, tts: &TtsConfig) -> Vec<(String, String)> {
        let mut config = self.clone();
        config
            .incoming_mode
            .get_or_insert_with(|| Self::DEFAULT_INCOMING_MODE.to_string());
        let mut pairs = match serde_json::to_value(&config) {
            Ok(Value::Object(map)) => query_pairs_from(map),
            _ => Vec::new(),
        };
        pairs.extend(tts.query_pairs());
        pairs
    }
}

/// A message pushed by the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// What the agent heard the user say.
    UserTranscript(String),
    LlmResponse(String),
    /// Synthesized speech of the response.
    AudioResponse(Bytes),
    /// The user interrupted; drop any audio still queued for playback.
    StopAudioResponse,
}

#[derive(Deserialize)]
struct AgentEnvelope {
    data: AgentPayload,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentPayload {
    UserTranscript { text: String },
    LlmResponse { text: String },
    AudioResponse { audio: String },
    StopAudioResponse,
}

impl AgentEvent {
    pub fn decode(raw: &str) -> Result<Self> {
        let envelope: AgentEnvelope =
            serde_json::from_str(raw).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(match envelope.data {
            AgentPayload::UserTranscript { text } => AgentEvent::UserTranscript(text),
            AgentPayload::LlmResponse { text } => AgentEvent::LlmResponse(text),
            AgentPayload::AudioResponse { audio } => AgentEvent::AudioResponse(Bytes::from(
                audio::decode_base64_audio(&audio)
                    .map_err(|e| Error::Decode(format!("invalid audio payload: {e}")))?,
            )),
            AgentPayload::StopAudioResponse => AgentEvent::StopAudioResponse,
        })
    }
}

/// A running agent conversation.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    connection: Connection,
}

impl AgentHandle {
    /// Sends text, or microphone audio as a binary frame.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<()> {
        self.connection.send(frame)
    }

    /// Registers the observer for agent events, replacing any previous one.
    /// Frames that are not agent events are logged and dropped.
    pub fn on_message(&self, mut handler: impl FnMut(AgentEvent) + Send + 'static) {
        self.connection.on_message(move |frame| {
            let decoded = match frame {
                Frame::Text(text) => AgentEvent::decode(&text),
                Frame::Binary(bytes) => String::from_utf8(bytes)
                    .map_err(|e| Error::Decode(e.to_string()))
                    .and_then(|text| AgentEvent::decode(&text)),
            };
            match decoded {
                Ok(event) => handler(event),
                Err(e) => warn!("Dropping agent frame: {}", e),
            }
        });
    }

    pub async fn stop(&self) -> Result<()> {
        self.connection.close().await
    }

    /// Waits until the agent socket closes.
    pub async fn closed(&self) -> Result<()> {
        self.connection.closed().await
    }

    pub fn is_open(&self) -> bool {
        self.connection.state() != ConnectionState::Closed
    }
}

/// Starts and stops conversations with one agent.
pub struct AgentBase {
    config: Arc<ClientConfig>,
    agent: AgentConfig,
    tts: TtsConfig,
    current: Mutex<Option<AgentHandle>>,
}

impl AgentBase {
    pub fn new(config: Arc<ClientConfig>, agent: AgentConfig, tts: TtsConfig) -> Self {
        Self {
            config,
            agent,
            tts,
            current: Mutex::new(None),
        }
    }

    pub fn agent_config(&self) -> &AgentConfig {
        &self.agent
    }

    pub fn url(&self) -> Result<String> {
        let query = self.agent.query_pairs(&self.tts);
        Ok(build_auth_url(
            &self.config,
            Protocol::WebSocket,
            "agents",
            &query,
        )?)
    }

    /// Opens the agent socket. Only one conversation may run at a time; one
    /// that the server already hung up on does not count.
    pub async fn start(&self) -> Result<AgentHandle> {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(AgentHandle::is_open) {
            return Err(Error::AgentAlreadyRunning);
        }

        let connection = Connection::open(&self.url()?).await?;
        connection.on_error(|err| warn!("Agent transport error: {}", err));
        info!(agent = %self.agent.agent_id, "Agent started");

        let handle = AgentHandle { connection };
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Closes the running conversation, if any.
    pub async fn stop(&self) -> Result<()> {
        let Some(handle) = self.current.lock().await.take() else {
            return Ok(());
        };
        info!(agent = %self.agent.agent_id, "Stopping agent");
        handle.stop().await
    }

    pub async fn is_running(&self) -> bool {
        self.current.lock().await.as_ref().is_some_and(AgentHandle::is_open)
    }
}
