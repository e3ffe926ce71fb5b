//! Repository layer for database access.
//!
//! Repositories are the only components allowed to mutate persisted
//! entities; everything else reads through these traits.

pub mod event;
pub mod job;
pub mod metadata;
pub mod processing;
pub mod recording;
pub mod settings;
pub mod stream;
pub mod streamer;
pub mod subscription;

pub use event::*;
pub use job::*;
pub use metadata::*;
pub use processing::*;
pub use recording::*;
pub use settings::*;
pub use stream::*;
pub use streamer::*;
pub use subscription::*;
