use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::inference::task::transcribe::Transcriber;

/// Process-wide state, built once before the listener starts and never mutated afterwards.
#[derive(Clone)]
pub(crate) struct AppState {
    /// `None` when loading failed; the service then refuses every transcription.
    pub(crate) model: Option<Arc<dyn Transcriber>>,
    pub(crate) default_language: Arc<str>,
}

impl AppState {
    pub(crate) fn new(model: Option<Arc<dyn Transcriber>>, default_language: &str) -> Self {
        Self {
            model,
            default_language: Arc::from(default_language),
        }
    }
}

/// Runs the loader exactly once. A failure is logged and leaves the handle unset, there is no
/// retry.
pub(crate) fn init_model<T, F>(load: F) -> Option<Arc<dyn Transcriber>>
where
    T: Transcriber + 'static,
    F: FnOnce() -> Result<T>,
{
    info!("Loading Whisper model...");
    match load() {
        Ok(model) => {
            info!("Whisper model loaded successfully.");
            Some(Arc::new(model))
        }
        Err(err) => {
            error!("Error loading Whisper model: {err:#}");
            None
        }
    }
}
