//! Payloads of the synthesis frames shared by the duplex and push transports.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use neuphonic_core::audio::{self, DEFAULT_SAMPLE_RATE};
use serde::Deserialize;

/// Appended to a message to make the server flush and stop the response.
pub const STOP_SENTINEL: &str = " <STOP>";

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    audio: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    sampling_rate: Option<u32>,
    #[serde(default)]
    stop: bool,
}

/// One decoded unit of synthesized audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub audio: Bytes,
    /// The text fragment this audio renders.
    pub text: String,
    pub sampling_rate: Option<u32>,
    /// No further chunks follow for this request.
    pub stop: bool,
}

impl Chunk {
    /// Decodes `{"data": {"audio": <base64>, "text", "sampling_rate", "stop"}}`.
    pub fn decode(raw: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| Error::Decode(e.to_string()))?;
        let payload = envelope.data;
        let audio = audio::decode_base64_audio(&payload.audio)
            .map_err(|e| Error::Decode(format!("invalid audio payload: {e}")))?;
        Ok(Self {
            audio: Bytes::from(audio),
            text: payload.text.unwrap_or_default(),
            sampling_rate: payload.sampling_rate,
            stop: payload.stop,
        })
    }
}

/// Audio and text of a whole response, concatenated in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesizedAudio {
    pub audio: Bytes,
    pub text: String,
    pub sampling_rate: Option<u32>,
}

impl SynthesizedAudio {
    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Self {
        let mut audio = BytesMut::new();
        let mut text = String::new();
        let mut sampling_rate = None;
        for chunk in chunks {
            audio.extend_from_slice(&chunk.audio);
            text.push_str(&chunk.text);
            sampling_rate = sampling_rate.or(chunk.sampling_rate);
        }
        Self {
            audio: audio.freeze(),
            text,
            sampling_rate,
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// The audio as a mono 16-bit WAV file.
    pub fn to_wav(&self) -> Vec<u8> {
        audio::to_wav(&self.audio, self.sampling_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunk() {
        let chunk = Chunk::decode(
            r#"{"data": {"audio": "AAEC", "text": "Hello", "sampling_rate": 22050, "stop": false}}"#,
        )
        .unwrap();
        assert_eq!(chunk.audio.as_ref(), &[0, 1, 2]);
        assert_eq!(chunk.text, "Hello");
        assert_eq!(chunk.sampling_rate, Some(22050));
        assert!(!chunk.stop);
    }

    #[test]
    fn test_decode_defaults() {
        let chunk = Chunk::decode(r#"{"data": {"audio": "", "text": null, "stop": true}}"#).unwrap();
        assert!(chunk.audio.is_empty());
        assert_eq!(chunk.text, "");
        assert!(chunk.stop);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(Chunk::decode("not json"), Err(Error::Decode(_))));
        assert!(matches!(
            Chunk::decode(r#"{"detail": "nope"}"#),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            Chunk::decode(r#"{"data": {"audio": "!!"}}"#),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_synthesized_audio_concatenates() {
        let chunks = [
            Chunk::decode(r#"{"data": {"audio": "AAE=", "text": "Hel"}}"#).unwrap(),
            Chunk::decode(r#"{"data": {"audio": "AgM=", "text": "lo", "sampling_rate": 16000, "stop": true}}"#)
                .unwrap(),
        ];
        let audio = SynthesizedAudio::from_chunks(&chunks);
        assert_eq!(audio.audio.as_ref(), &[0, 1, 2, 3]);
        assert_eq!(audio.text, "Hello");
        assert_eq!(audio.sampling_rate(), 16000);
        assert_eq!(audio.to_wav().len(), 44 + 4);

        assert_eq!(SynthesizedAudio::default().sampling_rate(), DEFAULT_SAMPLE_RATE);
    }
}
