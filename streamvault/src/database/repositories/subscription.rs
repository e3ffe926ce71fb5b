//! EventSub subscription id storage.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::Result;

/// Subscription repository trait.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn record(&self, streamer_id: i64, subscription_id: &str, kind: &str) -> Result<()>;
    async fn ids_for_streamer(&self, streamer_id: i64) -> Result<Vec<String>>;
    async fn remove(&self, subscription_id: &str) -> Result<()>;
}

/// SQLx implementation of SubscriptionRepository.
pub struct SqlxSubscriptionRepository {
    pool: SqlitePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn record(&self, streamer_id: i64, subscription_id: &str, kind: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO eventsub_subscriptions \
             (subscription_id, streamer_id, kind, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(subscription_id)
        .bind(streamer_id)
        .bind(kind)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ids_for_streamer(&self, streamer_id: i64) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT subscription_id FROM eventsub_subscriptions WHERE streamer_id = ?",
        )
        .bind(streamer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn remove(&self, subscription_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM eventsub_subscriptions WHERE subscription_id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
