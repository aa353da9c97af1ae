//! Scripted uploader.

use async_trait::async_trait;
use parking_lot::Mutex;
use slirc_bridge::{UploadError, Uploader};

/// Uploader that either always answers with a URL or always fails.
pub struct FakeUploader {
    fail: bool,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

#[allow(dead_code)]
impl FakeUploader {
    pub fn working() -> Self {
        Self {
            fail: false,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Every upload attempted so far, as (filename, content).
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, filename: &str, content: Vec<u8>) -> Result<String, UploadError> {
        let mut uploads = self.uploads.lock();
        uploads.push((filename.to_string(), content));
        if self.fail {
            return Err(UploadError::Status(503));
        }
        Ok(format!("https://files.test/{}/{filename}", uploads.len()))
    }
}
