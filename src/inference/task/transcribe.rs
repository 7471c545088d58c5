use std::path::Path;

use anyhow::Error;
use serde::{Deserialize, Serialize};

/// What a model reports for one audio file. Either field may be missing.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub language: Option<String>,
    pub text: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TranscribeResponse {
    pub language: String,
    pub transcription: String,
}

impl TranscribeResponse {
    /// Falls back to the requested language and an empty transcription for fields the model
    /// left out.
    pub fn from_transcript(transcript: Transcript, requested_language: String) -> Self {
        Self {
            language: transcript.language.unwrap_or(requested_language),
            transcription: transcript.text.unwrap_or_default(),
        }
    }
}

/// A loaded speech-to-text model. Implementations are shared between concurrent requests and
/// must not need exclusive access to transcribe.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcript, Error>;
}
