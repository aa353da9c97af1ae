//! Unified error handling for the bridge.
//!
//! Operations the host calls return [`BridgeError`]. Connection-level
//! failures never surface here: they are retried by the reconnect policy.

use thiserror::Error;

use crate::db::StoreError;
use crate::platform::{GroupId, PlatformError};
use crate::upload::UploadError;

/// Errors returned by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("channel {0} is not whitelisted")]
    NotWhitelisted(String),

    #[error("already a member of {0}")]
    AlreadyMember(String),

    #[error("group {0} is not bridged to a channel")]
    NotBridged(GroupId),

    #[error("invalid nick: {0}")]
    InvalidNick(String),

    #[error("nick already taken: {0}")]
    NickTaken(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("bridge worker is gone")]
    WorkerGone,
}

impl BridgeError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(_) => "store_error",
            Self::Platform(_) => "platform_error",
            Self::Upload(_) => "upload_error",
            Self::InvalidChannel(_) => "invalid_channel",
            Self::NotWhitelisted(_) => "not_whitelisted",
            Self::AlreadyMember(_) => "already_member",
            Self::NotBridged(_) => "not_bridged",
            Self::InvalidNick(_) => "invalid_nick",
            Self::NickTaken(_) => "nick_taken",
            Self::UnknownUser(_) => "unknown_user",
            Self::WorkerGone => "worker_gone",
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::WorkerGone
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for BridgeError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::WorkerGone
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
