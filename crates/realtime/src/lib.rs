//! Streaming side of the Neuphonic SDK: the duplex synthesis session, the
//! push-stream speaker, the agent socket and playback.

pub mod agent;
pub mod connection;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod sse;
pub mod tts;

pub use agent::{AgentBase, AgentConfig, AgentEvent, AgentHandle};
pub use connection::{Connection, ConnectionState, Frame};
pub use error::{Error, Result};
pub use playback::{AudioSink, Interrupt, MemorySink, PlaybackReport, Player, WavSink};
pub use protocol::{Chunk, STOP_SENTINEL, SynthesizedAudio};
pub use session::{Completion, FlightPolicy, SessionConfig, Speech, SpeechSession, response_timeout};
pub use sse::SseSpeaker;
pub use tts::Tts;
