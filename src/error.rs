use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

pub(crate) const MODEL_UNAVAILABLE: &str = "Whisper model is not available.";

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub enum ApiError {
    /// The model failed to load at startup, every request is refused.
    Unavailable,
    /// Copying the upload or running the model failed.
    TranscriptionFailed(anyhow::Error),
    /// A required multipart field was not sent.
    MissingField(&'static str),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    pub detail: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { detail: message }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            detail: message.to_string(),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable | ApiError::TranscriptionFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ApiError::Unavailable => MODEL_UNAVAILABLE.to_string(),
            ApiError::TranscriptionFailed(err) => format!("Transcription failed: {err:#}"),
            ApiError::MissingField(name) => format!("Missing field {name} in multipart form"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut res = Json(HttpErrorResponse::from(self.detail())).into_response();
        *res.status_mut() = status;
        res
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError::TranscriptionFailed(err.into())
    }
}

pub type ApiResult<T, E = ApiError> = Result<T, E>;
