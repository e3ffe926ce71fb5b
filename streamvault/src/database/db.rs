use sqlx::migrate::MigrateError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Failed to connect to the database: {0}")]
    ConnectionFailed(#[from] sqlx::Error),
    #[error("Failed to run migrations: {0}")]
    MigrationFailed(#[from] MigrateError),
}

/// Creates a connection pool to the SQLite database and runs migrations.
///
/// Foreign keys are enabled so cascade deletes fire for child rows.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, DbError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
