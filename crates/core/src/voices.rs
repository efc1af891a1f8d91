//! Voice listing, lookup and cloning.

use crate::{
    envelope::ApiResponse,
    error::{Error, Result},
    files,
    models::{IdOrName, Voice},
    transport::{ApiRequest, HttpTransport, UploadRequest},
};
use reqwest::Method;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, info};

#[derive(Deserialize)]
struct VoiceList {
    voices: Vec<Voice>,
}

#[derive(Deserialize)]
struct VoiceItem {
    voice: Voice,
}

#[derive(Deserialize)]
struct CloneResult {
    message: String,
    voice_id: String,
}

#[derive(Deserialize)]
struct MessageResult {
    message: String,
}

/// Parameters for cloning a new voice from a recording.
#[derive(Debug, Clone)]
pub struct CloneVoice {
    pub name: String,
    pub file: PathBuf,
    pub tags: Vec<String>,
}

/// Parameters for changing an existing voice.
#[derive(Debug, Clone)]
pub struct UpdateVoice {
    pub voice: IdOrName,
    pub new_file: Option<PathBuf>,
    pub new_name: Option<String>,
    pub new_tags: Option<Vec<String>>,
}

fn join_tags(tags: &[String]) -> Option<String> {
    (!tags.is_empty()).then(|| tags.join(", "))
}

/// Client for the `voices` resource.
#[derive(Clone)]
pub struct Voices {
    transport: Arc<dyn HttpTransport>,
}

impl Voices {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Resolves a voice reference to an id. Names are resolved with a full
    /// listing, so every call by name costs one `list()`.
    async fn resolve(&self, voice: &IdOrName) -> Result<Option<String>> {
        match voice {
            IdOrName::Id(id) => Ok(Some(id.clone())),
            IdOrName::Name(name) => self.get_id(name).await,
        }
    }

    /// Looks up the id of the first voice with the given name.
    pub async fn get_id(&self, name: &str) -> Result<Option<String>> {
        let voices = self.list().await?;
        Ok(voices
            .into_iter()
            .find(|voice| voice.name == name)
            .map(|voice| voice.id))
    }

    pub async fn list(&self) -> Result<Vec<Voice>> {
        let response = self.transport.request(ApiRequest::get("voices")).await?;
        match ApiResponse::<VoiceList>::parse(response) {
            Some(ApiResponse::Data(list)) => Ok(list.voices),
            _ => Err(Error::unknown("list voice")),
        }
    }

    pub async fn get(&self, voice: &IdOrName) -> Result<Voice> {
        let id = self
            .resolve(voice)
            .await?
            .ok_or_else(|| Error::NotFound("Can not find a voice by name".into()))?;

        let response = self
            .transport
            .request(ApiRequest::get(format!("voices/{id}")))
            .await?;
        match ApiResponse::<VoiceItem>::parse(response) {
            Some(ApiResponse::Data(item)) => Ok(item.voice),
            _ => Err(Error::unknown("get voice")),
        }
    }

    /// Uploads a recording and returns the id of the new voice.
    pub async fn clone_voice(&self, params: CloneVoice) -> Result<String> {
        let part = files::voice_file("voice_file", &params.file).await?;
        let request = UploadRequest::new(Method::POST, "voices")
            .with_query("voice_name", Some(params.name.clone()))
            .with_query("voice_tags", join_tags(&params.tags))
            .with_part(part);

        let response = self.transport.upload(request).await?;
        match ApiResponse::<CloneResult>::parse(response) {
            Some(ApiResponse::Data(result)) => {
                info!(
                    voice_id = %result.voice_id,
                    name = %params.name,
                    "Voice cloned: {}",
                    result.message
                );
                Ok(result.voice_id)
            }
            Some(ApiResponse::Detail(detail)) if detail.contains("This voice name already exists") => {
                Err(Error::Api(detail.message().unwrap_or_default().to_string()))
            }
            _ => Err(Error::unknown("clone voice")),
        }
    }

    /// Deletes a voice. Resolves to `false` when the voice does not exist.
    pub async fn delete(&self, voice: &IdOrName) -> Result<bool> {
        let Some(id) = self.resolve(voice).await? else {
            debug!(?voice, "No voice with that name, nothing to delete");
            return Ok(false);
        };

        let response = self
            .transport
            .request(ApiRequest::delete(format!("voices/{id}")))
            .await?;
        match ApiResponse::<MessageResult>::parse(response) {
            Some(ApiResponse::Data(_)) => Ok(true),
            Some(ApiResponse::Detail(detail)) if detail.contains("This voice_id does not exist") => {
                Ok(false)
            }
            _ => Err(Error::unknown("delete voice")),
        }
    }

    pub async fn update(&self, params: UpdateVoice) -> Result<bool> {
        let id = self
            .resolve(&params.voice)
            .await?
            .ok_or_else(|| Error::NotFound("Can not find a voice by name".into()))?;

        let new_tags = match &params.new_tags {
            Some(tags) if tags.is_empty() => return Err(Error::NothingToUpdate),
            Some(tags) => join_tags(tags),
            None => None,
        };
        if params.new_file.is_none() && new_tags.is_none() && params.new_name.is_none() {
            return Err(Error::NothingToUpdate);
        }

        let mut request = UploadRequest::new(Method::PATCH, format!("voices/{id}"))
            .with_query("new_voice_name", params.new_name.clone())
            .with_query("new_voice_tags", new_tags);
        if let Some(file) = &params.new_file {
            request = request.with_part(files::voice_file("new_voice_file", file).await?);
        }

        let response = self.transport.upload(request).await?;
        match ApiResponse::<MessageResult>::parse(response) {
            Some(ApiResponse::Data(result)) => {
                Ok(result.message.contains("Voice has successfully been updated"))
            }
            Some(ApiResponse::Detail(detail)) if detail.contains("Provided `voice_id` is invalid") => {
                Err(Error::NotFound("Voice does not exist".into()))
            }
            Some(ApiResponse::Detail(detail))
                if detail.contains("Audio file must be longer than 6 seconds") =>
            {
                Err(Error::Api(detail.message().unwrap_or_default().to_string()))
            }
            _ => Err(Error::unknown("update voice")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockHttpTransport;
    use serde_json::{Value, json};

    fn voice_json(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "tags": ["Tag 1"],
            "created_at": "2024-01-01",
            "updated_at": "2024-01-01",
            "type": "Cloned",
            "lang_code": "en",
            "voice_id": id
        })
    }

    fn expect_listing(mock: &mut MockHttpTransport) {
        mock.expect_request()
            .withf(|req| req.method == Method::GET && req.path == "voices")
            .returning(|_| {
                Ok(Some(json!({"data": {"voices": [
                    voice_json("v1", "Holt"),
                    voice_json("v2", "Cloned Name"),
                ]}})))
            });
    }

    #[tokio::test]
    async fn test_list_voices() {
        let mut mock = MockHttpTransport::new();
        expect_listing(&mut mock);

        let voices = Voices::new(Arc::new(mock)).list().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].name, "Cloned Name");
        assert_eq!(voices[0].tags, Some(vec!["Tag 1".to_string()]));
    }

    #[tokio::test]
    async fn test_list_malformed_response() {
        let mut mock = MockHttpTransport::new();
        mock.expect_request()
            .returning(|_| Ok(Some(json!({"unexpected": true}))));

        let err = Voices::new(Arc::new(mock)).list().await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown list voice error");
    }

    #[tokio::test]
    async fn test_get_by_name_resolves_through_listing() {
        let mut mock = MockHttpTransport::new();
        expect_listing(&mut mock);
        mock.expect_request()
            .withf(|req| req.path == "voices/v2")
            .times(1)
            .returning(|_| Ok(Some(json!({"data": {"voice": voice_json("v2", "Cloned Name")}}))));

        let voice = Voices::new(Arc::new(mock))
            .get(&IdOrName::name("Cloned Name"))
            .await
            .unwrap();
        assert_eq!(voice.id, "v2");
    }

    #[tokio::test]
    async fn test_get_unknown_name_is_not_found() {
        let mut mock = MockHttpTransport::new();
        expect_listing(&mut mock);

        let err = Voices::new(Arc::new(mock))
            .get(&IdOrName::name("Nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_unknown_name_resolves_false() {
        let mut mock = MockHttpTransport::new();
        expect_listing(&mut mock);

        let deleted = Voices::new(Arc::new(mock))
            .delete(&IdOrName::name("X"))
            .await
            .unwrap();
        assert!(!deleted);
    }

    #[tokio::test]
    async fn test_delete_missing_id_resolves_false() {
        let mut mock = MockHttpTransport::new();
        mock.expect_request()
            .withf(|req| req.method == Method::DELETE && req.path == "voices/gone")
            .returning(|_| Ok(Some(json!({"detail": "This voice_id does not exist."}))));

        let deleted = Voices::new(Arc::new(mock))
            .delete(&IdOrName::id("gone"))
            .await
            .unwrap();
        assert!(!deleted);
    }

    #[tokio::test]
    async fn test_delete_success_and_unknown_detail() {
        let mut mock = MockHttpTransport::new();
        mock.expect_request()
            .withf(|req| req.path == "voices/v1")
            .returning(|_| Ok(Some(json!({"data": {"message": "Voice deleted"}}))));
        mock.expect_request()
            .withf(|req| req.path == "voices/v3")
            .returning(|_| Ok(Some(json!({"detail": "Internal error"}))));

        let voices = Voices::new(Arc::new(mock));
        assert!(voices.delete(&IdOrName::id("v1")).await.unwrap());
        let err = voices.delete(&IdOrName::id("v3")).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown delete voice error");
    }

    #[tokio::test]
    async fn test_clone_voice_uploads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice1.wav");
        std::fs::write(&path, b"wav-bytes").unwrap();

        let mut mock = MockHttpTransport::new();
        mock.expect_upload()
            .withf(|req| {
                req.method == Method::POST
                    && req.path == "voices"
                    && req.query
                        == vec![
                            ("voice_name".to_string(), "Cloned Name".to_string()),
                            ("voice_tags".to_string(), "Tag 1, Tag 2".to_string()),
                        ]
                    && req.parts.len() == 1
                    && req.parts[0].field == "voice_file"
                    && req.parts[0].mime == "audio/wav"
            })
            .returning(|_| Ok(Some(json!({"data": {"message": "ok", "voice_id": "new-id"}}))));

        let id = Voices::new(Arc::new(mock))
            .clone_voice(CloneVoice {
                name: "Cloned Name".into(),
                file: path,
                tags: vec!["Tag 1".into(), "Tag 2".into()],
            })
            .await
            .unwrap();
        assert_eq!(id, "new-id");
    }

    #[tokio::test]
    async fn test_clone_voice_requires_a_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice1.wav");
        std::fs::write(&path, b"wav-bytes").unwrap();

        let mut mock = MockHttpTransport::new();
        mock.expect_upload()
            .returning(|_| Ok(Some(json!({"data": {"voice_id": "new-id"}}))));

        let err = Voices::new(Arc::new(mock))
            .clone_voice(CloneVoice {
                name: "Holt".into(),
                file: path,
                tags: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown clone voice error");
    }

    #[tokio::test]
    async fn test_clone_voice_duplicate_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice1.wav");
        std::fs::write(&path, b"wav-bytes").unwrap();

        let mut mock = MockHttpTransport::new();
        mock.expect_upload().returning(|_| {
            Ok(Some(json!({"detail": "This voice name already exists."})))
        });

        let err = Voices::new(Arc::new(mock))
            .clone_voice(CloneVoice {
                name: "Holt".into(),
                file: path,
                tags: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(ref msg) if msg == "This voice name already exists."));
    }

    #[tokio::test]
    async fn test_update_requires_a_change() {
        let voices = Voices::new(Arc::new(MockHttpTransport::new()));

        let err = voices
            .update(UpdateVoice {
                voice: IdOrName::id("v1"),
                new_file: None,
                new_name: None,
                new_tags: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NothingToUpdate));

        let err = voices
            .update(UpdateVoice {
                voice: IdOrName::id("v1"),
                new_file: None,
                new_name: None,
                new_tags: Some(vec![]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NothingToUpdate));
    }

    #[tokio::test]
    async fn test_update_tags() {
        let mut mock = MockHttpTransport::new();
        mock.expect_upload()
            .withf(|req| {
                req.method == Method::PATCH
                    && req.path == "voices/v1"
                    && req.query
                        == vec![("new_voice_tags".to_string(), "Tag 2, Tag 3".to_string())]
                    && req.parts.is_empty()
            })
            .returning(|_| {
                Ok(Some(
                    json!({"data": {"message": "Voice has successfully been updated."}}),
                ))
            });

        let updated = Voices::new(Arc::new(mock))
            .update(UpdateVoice {
                voice: IdOrName::id("v1"),
                new_file: None,
                new_name: None,
                new_tags: Some(vec!["Tag 2".into(), "Tag 3".into()]),
            })
            .await
            .unwrap();
        assert!(updated);
    }

    #[tokio::test]
    async fn test_update_invalid_voice_id() {
        let mut mock = MockHttpTransport::new();
        mock.expect_upload()
            .returning(|_| Ok(Some(json!({"detail": "Provided `voice_id` is invalid."}))));

        let err = Voices::new(Arc::new(mock))
            .update(UpdateVoice {
                voice: IdOrName::id("bogus"),
                new_file: None,
                new_name: Some("Renamed".into()),
                new_tags: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Voice does not exist");
    }
}
