//! Audio restoration jobs.

use crate::{
    envelope::ApiResponse,
    error::{Error, Result},
    files,
    models::{RestoreJob, RestoreJobStatus},
    transport::{ApiRequest, HttpTransport, UploadRequest},
};
use reqwest::Method;
use serde::Deserialize;
use std::{path::PathBuf, sync::Arc};

#[derive(Deserialize)]
struct JobCreated {
    job_id: String,
}

#[derive(Deserialize)]
struct JobList {
    jobs: Vec<RestoreJob>,
}

#[derive(Deserialize)]
struct JobDeleted {
    status: String,
    #[allow(dead_code)]
    message: String,
}

/// The transcript accompanying a restoration request.
#[derive(Debug, Clone, Default)]
pub enum Transcript {
    #[default]
    None,
    Text(String),
    /// Uploaded as a `text/plain` file part.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub audio_path: PathBuf,
    pub transcript: Transcript,
    pub lang_code: Option<String>,
}

impl RestoreRequest {
    pub const DEFAULT_LANG_CODE: &'static str = "eng-us";

    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
            transcript: Transcript::None,
            lang_code: None,
        }
    }
}

#[derive(Clone)]
pub struct Restorations {
    transport: Arc<dyn HttpTransport>,
}

impl Restorations {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Submits a recording for restoration and returns the job id.
    pub async fn restore(&self, params: RestoreRequest) -> Result<String> {
        let lang_code = params
            .lang_code
            .unwrap_or_else(|| RestoreRequest::DEFAULT_LANG_CODE.to_string());
        let mut request = UploadRequest::new(Method::POST, "restore")
            .with_query("lang_code", Some(lang_code))
            .with_part(files::voice_file("audio_file", &params.audio_path).await?);

        request = match params.transcript {
            Transcript::File(path) => {
                request.with_part(files::transcript_file("transcript", &path).await?)
            }
            Transcript::Text(text) => request.with_query("transcript", Some(text)),
            Transcript::None => request.with_query("transcript", Some(String::new())),
        };

        let response = self.transport.upload(request).await?;
        match ApiResponse::<JobCreated>::parse(response) {
            Some(ApiResponse::Data(created)) => Ok(created.job_id),
            _ => Err(Error::unknown("restore audio")),
        }
    }

    pub async fn get(&self, job_id: &str) -> Result<RestoreJobStatus> {
        let response = self
            .transport
            .request(ApiRequest::get(format!("restore/{job_id}")))
            .await?;
        match ApiResponse::<RestoreJobStatus>::parse(response) {
            Some(ApiResponse::Data(status)) => Ok(status),
            _ => Err(Error::unknown("audio restorations get")),
        }
    }

    pub async fn list(&self) -> Result<Vec<RestoreJob>> {
        let response = self.transport.request(ApiRequest::get("restore")).await?;
        match ApiResponse::<JobList>::parse(response) {
            Some(ApiResponse::Data(list)) => Ok(list.jobs),
            _ => Err(Error::unknown("audio restorations list")),
        }
    }

    /// Deletes a job; `true` when the server reports it as finished or not.
    pub async fn delete(&self, job_id: &str) -> Result<bool> {
        let response = self
            .transport
            .request(ApiRequest::delete(format!("restore/{job_id}")))
            .await?;
        match ApiResponse::<JobDeleted>::parse(response) {
            Some(ApiResponse::Data(deleted)) => {
                Ok(matches!(deleted.status.as_str(), "Finished" | "Not Finished"))
            }
            _ => Err(Error::unknown("audio restorations delete")),
        }
    }
}
