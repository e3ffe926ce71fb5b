//! HTTP surface: the EventSub callback, the status WebSocket, and the
//! minimal operator routes.

pub mod routes;
pub mod server;
pub mod signature;

pub use server::{ApiServer, ApiServerConfig, AppState};
