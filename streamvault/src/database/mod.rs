//! Persistence layer: pool setup, row models, repositories.

pub mod db;
pub mod models;
pub mod repositories;

pub use db::{init_pool, DbError};
