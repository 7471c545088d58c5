use std::sync::Arc;

use anyhow::anyhow;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ApiError, ApiResult};
use crate::inference::task::transcribe::{TranscribeResponse, Transcriber};
use crate::state::AppState;
use crate::upload::TempAudioFile;

pub(crate) const ROOT_MESSAGE: &str = "Whisper API is running. Post an audio file to /transcribe.";

#[derive(Serialize, Deserialize, Debug)]
pub struct StatusResponse {
    pub message: String,
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_root() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: ROOT_MESSAGE.to_string(),
    })
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_transcribe_request(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Json<TranscribeResponse>> {
    // Checked before the body is touched so a degraded service answers the same for any input.
    let Some(model) = state.model.clone() else {
        return Err(ApiError::Unavailable);
    };

    transcribe_upload(&state, model, request)
        .await
        .map(Json)
        .map_err(|err| {
            if let ApiError::TranscriptionFailed(cause) = &err {
                error!("Error during transcription: {cause:#}");
            }
            err
        })
}

async fn transcribe_upload(
    state: &AppState,
    model: Arc<dyn Transcriber>,
    request: Request,
) -> ApiResult<TranscribeResponse> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| anyhow!(rejection.body_text()))?;

    let mut audio = None;
    let mut language = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("audio_file") => audio = Some(TempAudioFile::from_field(field).await?),
            Some("language") => {
                let value = field.text().await?;
                let value = value.trim();
                if !value.is_empty() {
                    language = Some(value.to_string());
                }
            }
            other => debug!("Ignoring multipart field {other:?}"),
        }
    }

    let Some(audio) = audio else {
        return Err(ApiError::MissingField("audio_file"));
    };
    let language = language.unwrap_or_else(|| state.default_language.to_string());
    info!("Transcribing audio file for language: {language}");

    let path = audio.path().to_path_buf();
    let hint = language.clone();
    let transcript = tokio::task::spawn_blocking(move || model.transcribe(&path, &hint)).await??;
    info!("Transcription completed successfully.");

    drop(audio);
    Ok(TranscribeResponse::from_transcript(transcript, language))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::error::HttpErrorResponse;
    use crate::inference::task::transcribe::Transcript;

    const BOUNDARY: &str = "whisper-runner-test-boundary";

    /// Reads the uploaded file back as the transcription and remembers what it was called with.
    #[derive(Default)]
    struct EchoTranscriber {
        calls: Mutex<Vec<(PathBuf, String)>>,
    }

    impl Transcriber for EchoTranscriber {
        fn transcribe(&self, audio: &Path, language: &str) -> Result<Transcript> {
            let text = std::fs::read_to_string(audio)?;
            self.calls
                .lock()
                .unwrap()
                .push((audio.to_path_buf(), language.to_string()));
            Ok(Transcript {
                language: Some(language.to_string()),
                text: Some(text),
            })
        }
    }

    #[derive(Default)]
    struct FailingTranscriber {
        seen: Mutex<Option<PathBuf>>,
    }

    impl Transcriber for FailingTranscriber {
        fn transcribe(&self, audio: &Path, _language: &str) -> Result<Transcript> {
            assert!(audio.exists());
            *self.seen.lock().unwrap() = Some(audio.to_path_buf());
            bail!("decoder exploded")
        }
    }

    struct SilentTranscriber;

    impl Transcriber for SilentTranscriber {
        fn transcribe(&self, _audio: &Path, _language: &str) -> Result<Transcript> {
            Ok(Transcript::default())
        }
    }

    fn app_with(model: Option<Arc<dyn Transcriber>>, default_language: &str) -> Router {
        crate::app(AppState::new(model, default_language))
    }

    fn multipart_request(audio: Option<&[u8]>, language: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(language) = language {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\n{language}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(audio) = audio {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio_file\"; filename=\"clip.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(audio);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn transcribes_an_upload() {
        let model = Arc::new(EchoTranscriber::default());
        let app = app_with(Some(model.clone()), "en");

        let response = app
            .oneshot(multipart_request(Some(b"hello world"), Some("fr")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: TranscribeResponse = read_json(response).await;
        assert_eq!(body.language, "fr");
        assert_eq!(body.transcription, "hello world");

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (path, language) = &calls[0];
        assert_eq!(language, "fr");
        assert!(path.to_string_lossy().ends_with(".tmp"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn missing_language_uses_the_default() {
        let model = Arc::new(EchoTranscriber::default());
        let response = app_with(Some(model.clone()), "en")
            .oneshot(multipart_request(Some(b"bonjour"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: TranscribeResponse = read_json(response).await;
        assert_eq!(body.language, "en");

        let response = app_with(Some(model.clone()), "de")
            .oneshot(multipart_request(Some(b"hallo"), Some("  ")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let calls = model.calls.lock().unwrap();
        let languages: Vec<&str> = calls.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(languages, ["en", "de"]);
    }

    #[tokio::test]
    async fn field_order_does_not_matter() {
        let model = Arc::new(EchoTranscriber::default());
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio_file\"; filename=\"a.mp3\"\r\n\r\nfirst\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"extra\"\r\n\r\nignored\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\nja\r\n--{BOUNDARY}--\r\n"
            )
            .as_bytes(),
        );
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app_with(Some(model), "en").oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: TranscribeResponse = read_json(response).await;
        assert_eq!(body.language, "ja");
        assert_eq!(body.transcription, "first");
    }

    #[tokio::test]
    async fn absent_fields_fall_back() {
        let response = app_with(Some(Arc::new(SilentTranscriber)), "en")
            .oneshot(multipart_request(Some(b"..."), Some("es")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: TranscribeResponse = read_json(response).await;
        assert_eq!(body.language, "es");
        assert_eq!(body.transcription, "");
    }

    #[tokio::test]
    async fn unavailable_model_fails_for_any_input() {
        let requests = vec![
            multipart_request(Some(b"audio"), Some("en")),
            multipart_request(None, None),
            Request::builder()
                .method("POST")
                .uri("/transcribe")
                .body(Body::from("not a form"))
                .unwrap(),
        ];

        for request in requests {
            let response = app_with(None, "en").oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body: HttpErrorResponse = read_json(response).await;
            assert_eq!(body.detail, "Whisper model is not available.");
        }
    }

    #[tokio::test]
    async fn failure_is_reported_and_cleaned_up() {
        let model = Arc::new(FailingTranscriber::default());
        let response = app_with(Some(model.clone()), "en")
            .oneshot(multipart_request(Some(b"noise"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: HttpErrorResponse = read_json(response).await;
        assert_eq!(body.detail, "Transcription failed: decoder exploded");

        let seen = model.seen.lock().unwrap().clone().unwrap();
        assert!(!seen.exists());
    }

    #[tokio::test]
    async fn interrupted_upload_is_cleaned_up() {
        let marker = format!("interrupted-upload-{}", std::process::id());
        let mut payload = marker.clone().into_bytes();
        payload.resize(256 * 1024, b'x');

        // The audio part never reaches a closing boundary.
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio_file\"; filename=\"clip.wav\"\r\nContent-Type: audio/wav\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(&payload);
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let model = Arc::new(EchoTranscriber::default());
        let response = app_with(Some(model.clone()), "en")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: HttpErrorResponse = read_json(response).await;
        assert!(body.detail.starts_with("Transcription failed: "));
        assert!(model.calls.lock().unwrap().is_empty());

        let leftovers = std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.starts_with("whisper-") && name.ends_with(".tmp")
            })
            .filter(|entry| {
                std::fs::read(entry.path())
                    .map(|content| content.starts_with(marker.as_bytes()))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn malformed_body_is_a_transcription_failure() {
        let request = Request::builder()
            .method("POST")
            .uri("/transcribe")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app_with(Some(Arc::new(SilentTranscriber)), "en")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: HttpErrorResponse = read_json(response).await;
        assert!(body.detail.starts_with("Transcription failed: "));
    }

    #[tokio::test]
    async fn missing_audio_is_rejected() {
        let model = Arc::new(EchoTranscriber::default());
        let response = app_with(Some(model.clone()), "en")
            .oneshot(multipart_request(None, Some("en")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: HttpErrorResponse = read_json(response).await;
        assert_eq!(body.detail, "Missing field audio_file in multipart form");
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn root_is_fixed_regardless_of_state() {
        for app in [
            app_with(None, "en"),
            app_with(Some(Arc::new(SilentTranscriber)), "en"),
        ] {
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body: StatusResponse = read_json(response).await;
            assert_eq!(body.message, ROOT_MESSAGE);
        }
    }

    #[tokio::test]
    async fn large_uploads_are_not_limited() {
        let model = Arc::new(EchoTranscriber::default());
        let audio = "a".repeat(4 * 1024 * 1024);
        let response = app_with(Some(model), "en")
            .oneshot(multipart_request(Some(audio.as_bytes()), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: TranscribeResponse = read_json(response).await;
        assert_eq!(body.transcription.len(), audio.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_stay_separate() {
        let model = Arc::new(EchoTranscriber::default());
        let app = app_with(Some(model.clone()), "en");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let app = app.clone();
                tokio::spawn(async move {
                    let payload = format!("payload number {i}");
                    let response = app
                        .oneshot(multipart_request(Some(payload.as_bytes()), None))
                        .await
                        .unwrap();
                    assert_eq!(response.status(), StatusCode::OK);
                    let body: TranscribeResponse = read_json(response).await;
                    (payload, body.transcription)
                })
            })
            .collect();

        for handle in handles {
            let (sent, received) = handle.await.unwrap();
            assert_eq!(sent, received);
        }

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 16);
        let mut paths: Vec<_> = calls.iter().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 16);
        assert!(paths.iter().all(|p| !p.exists()));
    }
}
