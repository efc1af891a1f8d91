//! Helpers turning local files into multipart parts.

use crate::{error::Result, transport::FilePart};
use std::path::Path;

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string())
}

/// Mime type for an uploaded recording: WAV by extension, MPEG otherwise.
pub fn audio_mime(file_name: &str) -> &'static str {
    if file_name.to_lowercase().ends_with(".wav") {
        "audio/wav"
    } else {
        "audio/mpeg"
    }
}

/// Reads an audio file into a part named `field`.
pub async fn voice_file(field: &str, path: impl AsRef<Path>) -> Result<FilePart> {
    let path = path.as_ref();
    let file_name = base_name(path);
    let bytes = tokio::fs::read(path).await?;
    Ok(FilePart {
        field: field.to_string(),
        mime: audio_mime(&file_name).to_string(),
        file_name,
        bytes,
    })
}

/// Reads a plain-text transcript into a part named `field`.
pub async fn transcript_file(field: &str, path: impl AsRef<Path>) -> Result<FilePart> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    Ok(FilePart {
        field: field.to_string(),
        file_name: base_name(path),
        mime: "text/plain".to_string(),
        bytes,
    })
}
