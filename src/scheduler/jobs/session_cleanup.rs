use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::repositories::SessionStore;
use crate::scheduler::Job;

/// Purges revoked sessions whose revocation time predates the retention window.
pub struct SessionCleanupJob {
    sessions: Arc<dyn SessionStore>,
    retention: chrono::Duration,
    interval: Duration,
}

impl SessionCleanupJob {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        retention: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            sessions,
            retention,
            interval,
        }
    }
}

#[async_trait]
impl Job for SessionCleanupJob {
    fn name(&self) -> &str {
        "session_cleanup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - self.retention;
        let deleted = self.sessions.delete_revoked_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up revoked sessions");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MockSessionStore;

    #[tokio::test]
    async fn run_deletes_sessions_older_than_the_retention_window() {
        let mut store = MockSessionStore::new();
        store
            .expect_delete_revoked_before()
            .withf(|cutoff| {
                let expected = Utc::now() - chrono::Duration::days(7);
                (*cutoff - expected).num_seconds().abs() < 5
            })
            .times(1)
            .returning(|_| Ok(2500));

        let job = SessionCleanupJob::new(
            Arc::new(store),
            chrono::Duration::days(7),
            Duration::from_secs(3600),
        );
        job.run().await.unwrap();
    }

    #[tokio::test]
    async fn run_surfaces_store_errors() {
        let mut store = MockSessionStore::new();
        store
            .expect_delete_revoked_before()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let job = SessionCleanupJob::new(
            Arc::new(store),
            chrono::Duration::days(7),
            Duration::from_secs(3600),
        );
        assert!(job.run().await.is_err());
    }
}
