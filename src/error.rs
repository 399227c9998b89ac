//! Crate-wide error type (see spec §7, "Error handling design").

use thiserror::Error;

/// Every failure mode the transport and session layers can surface to a
/// caller. Retryable kinds are retried internally where spec §7 says so;
/// what reaches here is what the orchestrator is expected to act on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no matching ANT dongle driver found")]
    DriverNotFound,

    #[error("failed to open dongle: {0}")]
    DriverOpenFailed(String),

    #[error("dongle write timed out")]
    DriverTimeout,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame decode error: {0}")]
    FrameDecode(#[from] crate::frame::DecodeError),

    #[error("timed out waiting for a matching response")]
    TimedOut,

    #[error("waiter was cancelled")]
    Cancelled,

    #[error("transfer failed")]
    TransferFailed,

    #[error("unexpected channel response code: {0}")]
    UnexpectedCode(u8),

    #[error("authentication failed: {0:?}")]
    AuthFailed(crate::fs::command::AuthResponseType),

    #[error("download failed, device responded with code {0}")]
    DownloadFailed(u8),

    #[error("upload failed, device responded with code {0}")]
    UploadFailed(u8),

    #[error("local device profile is version {found}, expected {expected}")]
    ProfileVersionMismatch { found: u32, expected: u32 },

    #[error("malformed session command: {0}")]
    CommandDecode(String),

    #[error("malformed beacon: {0}")]
    BeaconDecode(String),

    #[error("malformed directory entry: {0}")]
    DirectoryDecode(String),
}

pub type Result<T> = std::result::Result<T, Error>;
