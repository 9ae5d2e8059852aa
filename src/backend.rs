//! Client for the local transcription backend (default 127.0.0.1:8610).
//!
//! The backend owns the microphone and the speech model; this side only
//! drives it: start capture, stop capture, transcribe the captured file.
//! The `DictationBackend` trait is the seam the orchestrator is tested
//! against.

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the backend client. Distinguished for logging only;
/// the orchestrator maps capture and transcription failures to the same
/// error state.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to start capture: {0}")]
    CaptureStart(String),
    #[error("failed to stop capture: {0}")]
    CaptureStop(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("health check failed: {0}")]
    Health(String),
}

/// Opaque handle to a finished capture, as returned by `/record/stop`.
/// Owned by the orchestrator for one transcription attempt, then discarded.
#[derive(Debug, Clone)]
pub struct CapturedAudio(String);

impl CapturedAudio {
    pub(crate) fn new(audio_file: String) -> Self {
        Self(audio_file)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct StopBody {
    audio_file: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
pub trait DictationBackend: Send + Sync {
    async fn start_capture(&self) -> Result<(), BackendError>;
    async fn stop_capture(&self) -> Result<CapturedAudio, BackendError>;
    async fn transcribe(
        &self,
        audio: &CapturedAudio,
        language: &str,
    ) -> Result<Transcription, BackendError>;
    async fn health(&self) -> Result<(), BackendError>;
}

/// HTTP implementation of the backend contract.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl DictationBackend for HttpBackend {
    async fn start_capture(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.url("/record/start"))
            .send()
            .await
            .map_err(|e| BackendError::CaptureStart(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::CaptureStart(format!(
                "backend returned {}",
                response.status()
            )));
        }

        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| BackendError::CaptureStart(e.to_string()))?;
        tracing::debug!("Capture started (backend status: {})", body.status);
        Ok(())
    }

    async fn stop_capture(&self) -> Result<CapturedAudio, BackendError> {
        let response = self
            .client
            .post(self.url("/record/stop"))
            .send()
            .await
            .map_err(|e| BackendError::CaptureStop(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::CaptureStop(format!(
                "backend returned {}",
                response.status()
            )));
        }

        let body: StopBody = response
            .json()
            .await
            .map_err(|e| BackendError::CaptureStop(e.to_string()))?;
        tracing::debug!("Capture stopped: {}", body.audio_file);
        Ok(CapturedAudio::new(body.audio_file))
    }

    async fn transcribe(
        &self,
        audio: &CapturedAudio,
        language: &str,
    ) -> Result<Transcription, BackendError> {
        let mut form = Form::new().text("audio_file", audio.as_str().to_string());
        if let Some(lang) = language_field(language) {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(self.url("/transcribe"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = match response.json::<ErrorBody>().await {
                Ok(body) => body.message.unwrap_or(body.error),
                Err(_) => format!("backend returned {status}"),
            };
            return Err(BackendError::Transcription(detail));
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Transcription(e.to_string()))
    }

    async fn health(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| BackendError::Health(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Health(format!(
                "backend returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// The `language` multipart field is omitted for auto-detection.
fn language_field(language: &str) -> Option<&str> {
    if language.is_empty() || language.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(language)
    }
}
