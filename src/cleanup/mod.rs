//! Blacklist maintenance.
//!
//! SQLite has no native expiring records, so revoked tokens are removed by
//! a periodic sweep instead. A row only matters while its token could still
//! pass signature validation; once `expires_at` passes, verification would
//! reject the token anyway, so deleting the row can never un-revoke it.

use anyhow::Result;
use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::DbPool;

/// Deletes expired blacklist entries on a fixed interval.
pub struct BlacklistSweeper {
    db: DbPool,
    interval_secs: u64,
}

impl BlacklistSweeper {
    pub fn new(db: DbPool, interval_secs: u64) -> Self {
        Self { db, interval_secs }
    }

    /// Run a single sweep, returning the number of entries removed.
    pub async fn run_sweep(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.db)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, "Swept expired blacklist entries");
        } else {
            tracing::debug!("No expired blacklist entries to sweep");
        }

        Ok(removed)
    }

    /// Sweep forever. Intended to be spawned as a background task.
    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_sweep().await {
                tracing::warn!(error = %e, "Blacklist sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration as ChronoDuration;

    async fn insert_entry(pool: &DbPool, token: &str, expires_at: &str) {
        sqlx::query(
            "INSERT INTO blacklisted_tokens (token, expires_at, created_at) VALUES (?, ?, ?)",
        )
        .bind(token)
        .bind(expires_at)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_entries() {
        let pool = db::init_memory().await.unwrap();

        let past = (Utc::now() - ChronoDuration::hours(1)).to_rfc3339();
        let future = (Utc::now() + ChronoDuration::hours(1)).to_rfc3339();
        insert_entry(&pool, "expired-token", &past).await;
        insert_entry(&pool, "live-token", &future).await;

        let sweeper = BlacklistSweeper::new(pool.clone(), 3600);
        let removed = sweeper.run_sweep().await.unwrap();
        assert_eq!(removed, 1);

        let remaining: Vec<(String,)> = sqlx::query_as("SELECT token FROM blacklisted_tokens")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, vec![("live-token".to_string(),)]);
    }

    #[tokio::test]
    async fn test_sweep_on_empty_table() {
        let pool = db::init_memory().await.unwrap();

        let sweeper = BlacklistSweeper::new(pool, 3600);
        assert_eq!(sweeper.run_sweep().await.unwrap(), 0);
    }
}
