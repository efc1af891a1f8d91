//! Command-line surface.

use clap::{Args, Parser, Subcommand};
use neuphonic::{ConfigOverrides, FlightPolicy, IdOrName, SessionConfig, Transcript, TtsConfig};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "neuphonic", version, about = "Command-line client for the Neuphonic TTS service")]
pub struct Cli {
    /// Service host, e.g. eu-west-1.api.neuphonic.com
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    #[arg(long, global = true)]
    pub api_key: Option<String>,
    /// Use http/ws instead of https/wss
    #[arg(long, global = true)]
    pub plain_http: bool,
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Flags given on the command line; everything else comes from the
    /// environment.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            jwt_token: None,
            base_http: self.plain_http.then_some(true),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Synthesize text into a WAV file
    Speak(SpeakArgs),
    #[command(subcommand)]
    Voices(VoicesCommand),
    #[command(subcommand)]
    Agents(AgentsCommand),
    /// Audio restoration jobs
    #[command(subcommand)]
    Restore(RestoreCommand),
    /// Print a short-lived token for browser use
    Jwt,
}

#[derive(Debug, Args)]
pub struct SpeakArgs {
    /// Each value is sent as its own request
    #[arg(required = true)]
    pub text: Vec<String>,
    #[arg(short, long, default_value = "speech.wav")]
    pub output: PathBuf,
    /// Use the one-shot push stream instead of the duplex socket
    #[arg(long)]
    pub sse: bool,
    /// Allow only one outstanding request on the socket
    #[arg(long, conflicts_with = "sse")]
    pub single_flight: bool,
    #[arg(long)]
    pub voice_id: Option<String>,
    #[arg(long)]
    pub lang_code: Option<String>,
    #[arg(long)]
    pub speed: Option<f32>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub sampling_rate: Option<u32>,
}

impl SpeakArgs {
    pub fn tts_config(&self) -> TtsConfig {
        TtsConfig {
            voice_id: self.voice_id.clone(),
            speed: self.speed,
            temperature: self.temperature,
            lang_code: self.lang_code.clone(),
            sampling_rate: self.sampling_rate,
            encoding: None,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            policy: if self.single_flight {
                FlightPolicy::Single
            } else {
                FlightPolicy::Multi
            },
            ..Default::default()
        }
    }
}

/// Addresses a voice by id or by name.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct VoiceSelector {
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
}

impl VoiceSelector {
    pub fn to_id_or_name(&self) -> IdOrName {
        match (&self.id, &self.name) {
            (Some(id), _) => IdOrName::id(id.clone()),
            (None, name) => IdOrName::name(name.clone().unwrap_or_default()),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum VoicesCommand {
    List,
    Get(VoiceSelector),
    /// Clone a voice from a recording
    Clone {
        name: String,
        file: PathBuf,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    Update {
        #[command(flatten)]
        voice: VoiceSelector,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        new_name: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    Delete(VoiceSelector),
}

#[derive(Debug, Subcommand)]
pub enum AgentsCommand {
    List,
    Get {
        id: String,
    },
    Create {
        name: String,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long)]
        greeting: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum RestoreCommand {
    /// Submit a recording for restoration
    Submit {
        audio: PathBuf,
        #[arg(long, conflicts_with = "transcript_file")]
        transcript: Option<String>,
        #[arg(long)]
        transcript_file: Option<PathBuf>,
        #[arg(long)]
        lang_code: Option<String>,
    },
    Status {
        job_id: String,
    },
    List,
    Delete {
        job_id: String,
    },
}

pub fn transcript(text: Option<String>, file: Option<PathBuf>) -> Transcript {
    match (text, file) {
        (_, Some(path)) => Transcript::File(path),
        (Some(text), None) => Transcript::Text(text),
        (None, None) => Transcript::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "neuphonic",
            "voices",
            "list",
            "--base-url",
            "localhost:8000",
            "--plain-http",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.base_url.as_deref(), Some("localhost:8000"));
        assert_eq!(overrides.base_http, Some(true));
        assert_eq!(overrides.api_key, None);

        let cli = Cli::try_parse_from(["neuphonic", "jwt"]).unwrap();
        assert_eq!(cli.overrides().base_http, None);
    }

    #[test]
    fn test_speak_args() {
        let cli = Cli::try_parse_from([
            "neuphonic",
            "speak",
            "Hello",
            "World",
            "--voice-id",
            "v1",
            "--speed",
            "1.2",
            "--single-flight",
        ])
        .unwrap();
        let Command::Speak(args) = cli.command else {
            panic!("expected speak");
        };
        assert_eq!(args.text, vec!["Hello", "World"]);
        assert_eq!(args.output, PathBuf::from("speech.wav"));
        assert_eq!(args.tts_config().voice_id.as_deref(), Some("v1"));
        assert_eq!(args.session_config().policy, FlightPolicy::Single);

        assert!(Cli::try_parse_from(["neuphonic", "speak", "x", "--sse", "--single-flight"]).is_err());
        assert!(Cli::try_parse_from(["neuphonic", "speak"]).is_err());
    }

    #[test]
    fn test_voice_selector_requires_exactly_one() {
        let cli = Cli::try_parse_from(["neuphonic", "voices", "delete", "--name", "Holt"]).unwrap();
        let Command::Voices(VoicesCommand::Delete(selector)) = cli.command else {
            panic!("expected voices delete");
        };
        assert_eq!(selector.to_id_or_name(), IdOrName::name("Holt"));

        assert!(Cli::try_parse_from(["neuphonic", "voices", "get"]).is_err());
        assert!(
            Cli::try_parse_from(["neuphonic", "voices", "get", "--id", "a", "--name", "b"]).is_err()
        );
    }

    #[test]
    fn test_clone_tags_split_on_commas() {
        let cli = Cli::try_parse_from([
            "neuphonic", "voices", "clone", "Mine", "voice.wav", "--tags", "calm,deep",
        ])
        .unwrap();
        let Command::Voices(VoicesCommand::Clone { tags, .. }) = cli.command else {
            panic!("expected voices clone");
        };
        assert_eq!(tags, vec!["calm", "deep"]);
    }

    #[test]
    fn test_transcript_choice() {
        assert!(matches!(transcript(None, None), Transcript::None));
        assert!(matches!(
            transcript(Some("hi".into()), None),
            Transcript::Text(text) if text == "hi"
        ));
        assert!(matches!(
            transcript(None, Some("t.txt".into())),
            Transcript::File(_)
        ));
    }
}
