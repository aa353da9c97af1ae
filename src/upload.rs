//! Out-of-band upload of attachments and oversized messages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::debug;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected with status {0}")]
    Status(u16),
    #[error("upload returned an empty body")]
    EmptyResponse,
}

/// Uploads a file and returns a public URL for it.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, filename: &str, content: Vec<u8>) -> Result<String, UploadError>;
}

/// Uploader posting a multipart form with a single `file` field, in the
/// style of 0x0.st. The response body is the URL.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .user_agent(concat!("slirc-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, filename: &str, content: Vec<u8>) -> Result<String, UploadError> {
        let size = content.len();
        let part = Part::bytes(content).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }

        let url = resp.text().await?.trim().to_string();
        if url.is_empty() {
            return Err(UploadError::EmptyResponse);
        }
        debug!(%filename, size, %url, "Upload complete");
        Ok(url)
    }
}
