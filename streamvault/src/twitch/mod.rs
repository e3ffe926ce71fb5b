//! Outbound Twitch Helix client.

pub mod api;
pub mod auth;
pub mod models;

pub use api::TwitchApiClient;
pub use auth::TwitchAuth;
pub use models::{TwitchGame, TwitchStream, TwitchUser};
