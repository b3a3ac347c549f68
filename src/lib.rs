pub mod audio;
pub mod config;
pub mod error;
pub mod remote;
pub mod session;
pub mod upload;

pub use audio::{
    AudioDevice, ChunkBatch, ChunkBuffer, DeviceRegistry, EncodedRecording, FileInputProvider,
    InputProvider, InputStream, RecorderEvent, SampleBuffer, SegmentFormat, VisualizationFrame,
    WavHeader,
};
pub use config::Config;
pub use error::{CaptureError, CaptureResult};
pub use remote::{HttpRemote, RemoteRecorder};
pub use session::{CaptureSession, SessionConfig, SessionStats, SessionStatus, StopOutcome};
pub use upload::UploadHandoff;
