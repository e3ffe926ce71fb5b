//! Domain entities and value objects.

pub mod processing;
pub mod recording;
pub mod settings;
pub mod stream;
pub mod stream_event;
pub mod stream_metadata;
pub mod streamer;
pub mod types;
pub mod value_objects;

pub use processing::ProcessingState;
pub use recording::Recording;
pub use settings::{GlobalSettings, NotificationSettings, StreamerRecordingSettings};
pub use stream::Stream;
pub use stream_event::StreamEvent;
pub use stream_metadata::StreamMetadata;
pub use streamer::Streamer;
pub use types::{ProcessingStep, RecordingStatus, StepStatus, StreamEventKind};
