//! Client SDK for the Neuphonic text-to-speech service.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use neuphonic::{ConfigOverrides, SessionConfig, TtsConfig, create_client};
//!
//! let client = create_client(ConfigOverrides::default())?;
//! let session = client
//!     .tts
//!     .websocket(TtsConfig::default(), SessionConfig::default())
//!     .await?;
//! let audio = session.send_with_stop("Hello, world!").await?.collect_audio().await;
//! std::fs::write("hello.wav", audio.to_wav())?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;

pub use client::{Client, create_client};
pub use neuphonic_core::{
    Agent, Agents, ClientConfig, CloneVoice, ConfigError, ConfigOverrides, CreateAgent, Error,
    IdOrName, RestoreJob, RestoreJobStatus, RestoreRequest, Restorations, Result, Transcript,
    TtsConfig, UpdateVoice, Voice, Voices, audio,
};
pub use neuphonic_realtime::{
    AgentBase, AgentConfig, AgentEvent, AgentHandle, AudioSink, Chunk, Completion, FlightPolicy,
    Interrupt, MemorySink, PlaybackReport, Player, SessionConfig, Speech, SpeechSession,
    SseSpeaker, SynthesizedAudio, Tts, WavSink,
};

/// Errors of the streaming transports.
pub use neuphonic_realtime::Error as StreamError;
