//! Recording lifecycle management.

pub mod actor;
pub mod capture;
pub mod lifecycle;
pub mod orchestrator;
pub mod preflight;

pub use actor::{ActorStatus, RecorderContext, MIN_CAPTURE_BYTES};
pub use capture::{build_capture_command, CaptureCommand};
pub use lifecycle::{LifecycleInput, LifecycleState};
pub use orchestrator::RecordingOrchestrator;
pub use preflight::check_proxy_connectivity;
