//! Resource records returned by the REST API and the TTS request settings.
//!
//! Records are immutable snapshots; the client keeps no cache and every read
//! re-fetches from the server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub model_availability: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(rename = "type")]
    pub voice_type: String,
    pub lang_code: String,
    pub voice_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub agent_id: String,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreJob {
    pub job_id: String,
    pub language: String,
    pub created_at: String,
    pub status: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreJobStatus {
    pub status: String,
    #[serde(default)]
    pub file_url: Option<String>,
    pub message: String,
}

/// Addresses a voice either by its server id or by its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrName {
    Id(String),
    Name(String),
}

impl IdOrName {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

/// Synthesis settings shared by the duplex and push transports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl TtsConfig {
    pub const DEFAULT_LANG_CODE: &'static str = "en";

    pub fn lang_code(&self) -> &str {
        self.lang_code.as_deref().unwrap_or(Self::DEFAULT_LANG_CODE)
    }

    /// The settings as query parameters, skipping unset fields.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Ok(Value::Object(map)) = serde_json::to_value(self) else {
            return Vec::new();
        };
        query_pairs_from(map)
    }
}

/// Flattens a JSON object into query parameters, skipping nulls.
pub fn query_pairs_from(map: Map<String, Value>) -> Vec<(String, String)> {
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}
