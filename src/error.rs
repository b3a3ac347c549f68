use thiserror::Error;

/// Errors raised by the capture pipeline.
///
/// Variants carry a rendered message rather than the source error so a failure
/// can be stored in the session's `Error` state and handed back to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to enumerate input devices: {0}")]
    DeviceEnumeration(String),

    #[error("Unknown input device: {0}")]
    UnknownDevice(String),

    #[error("No input device selected")]
    NoDeviceSelected,

    #[error("A capture session is already active")]
    SessionActive,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Remote recording start failed: {0}")]
    RemoteStartFailed(String),

    #[error("Remote recording stop failed: {0}")]
    RemoteStopFailed(String),

    #[error("Failed to decode captured audio: {0}")]
    DecodeFailed(String),

    #[error("Failed to encode recording: {0}")]
    EncodingFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid capture configuration: {0}")]
    InvalidConfig(String),

    #[error("Input stream error: {0}")]
    Stream(String),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
