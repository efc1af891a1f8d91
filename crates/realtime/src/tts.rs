use crate::{
    error::Result,
    session::{SessionConfig, SpeechSession},
    sse::SseSpeaker,
};
use neuphonic_core::{
    ReqwestTransport, TtsConfig,
    transport::{Protocol, build_auth_url},
};
use std::sync::Arc;

/// Entry point to both synthesis transports.
#[derive(Clone)]
pub struct Tts {
    transport: Arc<ReqwestTransport>,
}

impl Tts {
    pub fn new(transport: Arc<ReqwestTransport>) -> Self {
        Self { transport }
    }

    /// `wss://{base}/speak/{lang_code}?{settings}&{credentials}`
    pub fn websocket_url(&self, tts: &TtsConfig) -> Result<String> {
        let path = format!("speak/{}", tts.lang_code());
        let query: Vec<(String, String)> = tts
            .query_pairs()
            .into_iter()
            .filter(|(key, _)| key != "lang_code")
            .collect();
        Ok(build_auth_url(
            self.transport.config(),
            Protocol::WebSocket,
            &path,
            &query,
        )?)
    }

    /// Opens a duplex session; connect errors surface here.
    pub async fn websocket(&self, tts: TtsConfig, session: SessionConfig) -> Result<SpeechSession> {
        SpeechSession::open(self.websocket_url(&tts)?, session).await
    }

    pub fn sse(&self, tts: TtsConfig) -> SseSpeaker {
        SseSpeaker::new(&self.transport, tts)
    }
}
