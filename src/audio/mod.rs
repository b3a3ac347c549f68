pub mod backend;
pub mod chunk;
pub mod decode;
pub mod device;
pub mod file;
pub mod visualize;
pub mod wav;

pub use backend::{
    DeviceInfo, DeviceKind, InputProvider, InputStream, RecorderEvent, SegmentFormat, StreamLease,
};
pub use chunk::{ChunkBatch, ChunkBuffer, ChunkCollector};
pub use decode::{decode, SampleBuffer};
pub use device::{AudioDevice, DeviceRegistry};
pub use file::{AudioFile, FileInputProvider};
pub use visualize::{AmplitudeTap, VisualizationFeed, VisualizationFrame, VisualizationTask};
pub use wav::{encode, EncodedRecording, WavHeader};
