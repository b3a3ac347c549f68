use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::info;

use super::messages::{
    ErrorDetail, RecordingStatus, StartReceipt, StartRequest, StartResponse, StopReceipt,
    StopResponse,
};
use crate::audio::EncodedRecording;

/// Remote recording resource collaborator
///
/// Timeouts and retries belong to the implementation; the session never
/// imposes its own.
#[async_trait::async_trait]
pub trait RemoteRecorder: Send + Sync {
    /// Begin server-side bookkeeping for a recording
    async fn start(&self, title: Option<&str>) -> Result<StartReceipt>;

    /// End server-side bookkeeping
    async fn stop(&self) -> Result<StopReceipt>;

    /// Deliver the encoded artifact and its metadata
    async fn upload(&self, recording: &EncodedRecording) -> Result<()>;
}

/// HTTP client for the meeting server
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Remote recorder at {}", base_url);
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Query the server's current recording status
    pub async fn status(&self) -> Result<RecordingStatus> {
        let response = self
            .client
            .get(self.url("/api/meetings/status"))
            .send()
            .await
            .context("Failed to reach recording server")?;

        let response = ensure_success(response, "Status query").await?;
        response
            .json()
            .await
            .context("Failed to parse status response")
    }
}

/// Turn a non-2xx reply into an error carrying the server's detail
async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorDetail>(&body) {
        Ok(error) => error.detail,
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => body,
    };

    Err(anyhow!("{} rejected ({}): {}", operation, status, message))
}

#[async_trait::async_trait]
impl RemoteRecorder for HttpRemote {
    async fn start(&self, title: Option<&str>) -> Result<StartReceipt> {
        let response = self
            .client
            .post(self.url("/api/meetings/start"))
            .json(&StartRequest {
                title: title.map(str::to_string),
            })
            .send()
            .await
            .context("Failed to reach recording server")?;

        let response = ensure_success(response, "Recording start").await?;
        let body = response.text().await.unwrap_or_default();
        let reply: Option<StartResponse> = serde_json::from_str(&body).ok();

        let remote_session_id = reply
            .and_then(|r| r.meeting_id)
            .unwrap_or_else(|| format!("meeting-{}", uuid::Uuid::new_v4()));

        info!("Server recording started: {}", remote_session_id);

        Ok(StartReceipt { remote_session_id })
    }

    async fn stop(&self) -> Result<StopReceipt> {
        let response = self
            .client
            .post(self.url("/api/meetings/stop"))
            .send()
            .await
            .context("Failed to reach recording server")?;

        let response = ensure_success(response, "Recording stop").await?;
        let reply: StopResponse = response
            .json()
            .await
            .context("Failed to parse stop response")?;

        info!("Server recording stopped: {}", reply.audio_path);

        Ok(StopReceipt {
            audio_path: reply.audio_path,
        })
    }

    async fn upload(&self, recording: &EncodedRecording) -> Result<()> {
        let audio = Part::bytes(recording.wav_bytes().to_vec())
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .context("Failed to build audio part")?;

        let tags = serde_json::to_string(&recording.tags)?;

        let form = Form::new()
            .part("audio", audio)
            .text("title", recording.title.clone().unwrap_or_default())
            .text("duration", recording.duration_seconds.to_string())
            .text("tags", tags)
            .text("notes", recording.notes.clone().unwrap_or_default());

        info!(
            "Uploading recording: {} bytes, {:.1}s",
            recording.len(),
            recording.duration_seconds
        );

        let response = self
            .client
            .post(self.url("/api/meetings/upload"))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach recording server")?;

        ensure_success(response, "Upload").await?;

        info!("Upload accepted");
        Ok(())
    }
}
