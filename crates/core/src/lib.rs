//! REST side of the Neuphonic SDK: configuration, the HTTP transport, the
//! resource clients and the audio helpers shared with the realtime crate.

pub mod agents;
pub mod audio;
pub mod config;
pub mod envelope;
pub mod error;
pub mod files;
pub mod models;
pub mod restorations;
pub mod transport;
pub mod voices;

pub use agents::{Agents, CreateAgent};
pub use config::{ClientConfig, ConfigError, ConfigOverrides};
pub use envelope::{ApiResponse, ErrorDetail};
pub use error::{Error, Result};
pub use models::{Agent, IdOrName, RestoreJob, RestoreJobStatus, TtsConfig, Voice};
pub use restorations::{RestoreRequest, Restorations, Transcript};
pub use transport::{HttpTransport, Protocol, ReqwestTransport};
pub use voices::{CloneVoice, UpdateVoice, Voices};
