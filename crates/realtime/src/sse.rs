//! One-shot synthesis over a server-sent event stream.
//!
//! Each call posts the text and reads `message` events until the stream ends.
//! The service has no distinct "done" event on this transport: an `error`
//! event or the end of the body is the normal end of a response.

use crate::{
    error::{Error, Result},
    protocol::{Chunk, SynthesizedAudio},
};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use neuphonic_core::{
    ClientConfig, ReqwestTransport, TtsConfig,
    transport::{Protocol, build_auth_url},
};
use serde_json::{Map, Value};
use std::{fmt::Display, sync::Arc};
use tracing::{debug, warn};

/// Push-stream synthesis with a fixed [`TtsConfig`].
#[derive(Debug, Clone)]
pub struct SseSpeaker {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    tts: TtsConfig,
}

impl SseSpeaker {
    pub fn new(transport: &ReqwestTransport, tts: TtsConfig) -> Self {
        Self {
            client: transport.client().clone(),
            config: transport.config().clone(),
            tts,
        }
    }

    pub fn tts_config(&self) -> &TtsConfig {
        &self.tts
    }

    pub fn url(&self) -> Result<String> {
        let path = format!("sse/speak/{}", self.tts.lang_code());
        Ok(build_auth_url(&self.config, Protocol::Http, &path, &[])?)
    }

    /// Synthesizes `text`, buffering the whole response.
    pub async fn send(&self, text: &str) -> Result<SynthesizedAudio> {
        let mut body = match serde_json::to_value(&self.tts) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        body.insert("text".to_string(), Value::String(text.to_string()));

        let mut request = self.client.post(self.url()?).json(&body);
        if let Some(api_key) = self.config.api_key() {
            request = request.header("x-api-key", api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(Error::Push(format!(
                "Server returned error {}: {}",
                status, body
            )));
        }

        let chunks = collect_chunks(response.bytes_stream()).await;
        debug!(chunks = chunks.len(), "Push stream finished");
        Ok(SynthesizedAudio::from_chunks(&chunks))
    }
}

/// Decodes an event-stream body into chunks, stopping at its end marker.
/// A broken body ends the response with what arrived so far.
async fn collect_chunks<S, B, E>(body: S) -> Vec<Chunk>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut events = std::pin::pin!(body.eventsource());
    let mut chunks = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                if !accept(&event.event, &event.data, &mut chunks) {
                    break;
                }
            }
            Err(e) => {
                warn!("Push stream interrupted: {}", e);
                break;
            }
        }
    }
    chunks
}

/// Collects `message` events; `false` once the stream signalled its end.
fn accept(event: &str, data: &str, chunks: &mut Vec<Chunk>) -> bool {
    match event {
        "message" => {
            match Chunk::decode(data) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!("Dropping push event: {}", e),
            }
            true
        }
        "error" => false,
        other => {
            debug!(event = other, "Ignoring push event");
            true
        }
    }
}
