//! Effective configuration resolution.

pub mod cache;
pub mod service;

pub use cache::ConfigCache;
pub use service::{ConfigResolver, ConfigService, EffectiveConfig};
