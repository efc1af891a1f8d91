use neuphonic_core::{
    Agents, ClientConfig, ConfigOverrides, Error, HttpTransport, Restorations, Result,
    ReqwestTransport, TtsConfig, Voices, envelope::ApiResponse, transport::ApiRequest,
};
use neuphonic_realtime::{AgentBase, AgentConfig, Tts};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Deserialize)]
struct JwtToken {
    jwt_token: String,
}

/// Entry point bundling every resource client over one transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<ReqwestTransport>,
    pub voices: Voices,
    pub agents: Agents,
    pub restorations: Restorations,
    pub tts: Tts,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", self.config())
            .finish_non_exhaustive()
    }
}

/// Builds a client from explicit overrides, the environment and defaults, in
/// that order of precedence.
pub fn create_client(overrides: ConfigOverrides) -> Result<Client> {
    Client::new(ClientConfig::resolve(overrides)?)
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(Arc::new(config))?);
        let http: Arc<dyn HttpTransport> = transport.clone();
        debug!(base_url = %transport.config().base_url, "Client created");
        Ok(Self {
            voices: Voices::new(http.clone()),
            agents: Agents::new(http.clone()),
            restorations: Restorations::new(http),
            tts: Tts::new(transport.clone()),
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    /// Exchanges the API key for a short-lived token usable from browsers.
    pub async fn jwt(&self) -> Result<String> {
        let response = self.transport.request(ApiRequest::post("sse/auth")).await?;
        match ApiResponse::<JwtToken>::parse(response) {
            Some(ApiResponse::Data(token)) => Ok(token.jwt_token),
            _ => Err(Error::Unknown {
                operation: "get jwt token",
            }),
        }
    }

    /// A conversation starter for one hosted agent.
    pub fn agent(&self, agent: AgentConfig, tts: TtsConfig) -> AgentBase {
        AgentBase::new(self.transport.config().clone(), agent, tts)
    }
}
