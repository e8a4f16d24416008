//! Durable session store (PostgreSQL).
//!
//! Authoritative for audit history; allowed to lag behind the cache. Every
//! call carries its own fixed timeout so a slow database cannot block a
//! caller indefinitely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::models::session::{Session, SessionStatus};

/// Per-call budget for durable-store statements, independent of any caller
/// context.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Rows claimed and deleted per cleanup pass.
const CLEANUP_BATCH_SIZE: i64 = 1000;

pub const REVOKED_NEW_LOGIN: &str = "New login from another device";
pub const REVOKED_LOGOUT: &str = "User logged out";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session, revoking any still-active rows for the same user
    /// and touching the user's last_login_at, all in one transaction.
    async fn create(&self, session: &Session) -> anyhow::Result<()>;

    async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<Session>>;

    /// Newest live row for the user, if any.
    async fn get_active_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<Session>>;

    /// Marks a single session revoked. Idempotent: a token that is already
    /// revoked (or unknown) matches zero rows and is not an error.
    async fn mark_revoked(&self, token: &str, reason: &str) -> anyhow::Result<()>;

    /// Revokes every active session for the user, returning how many rows
    /// changed.
    async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> anyhow::Result<u64>;

    /// Deletes revoked sessions whose revocation is older than `cutoff`, in
    /// bounded batches. Returns the total number of rows deleted.
    async fn delete_revoked_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => anyhow::bail!("database query timed out after {:?}", QUERY_TIMEOUT),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &Session) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        let session = session.clone();
        with_timeout(async move {
            let mut tx = pool.begin().await?;

            // Belt-and-braces revocation of any rows the cache-driven revoke
            // has not reached yet; keeps the durable trail consistent with
            // the single-active-session rule.
            sqlx::query(
                r#"
                UPDATE sessions
                SET status = $1, revoked_at = CURRENT_TIMESTAMP, revoked_reason = $2
                WHERE user_id = $3 AND status = $4
                "#,
            )
            .bind(SessionStatus::Revoked)
            .bind(REVOKED_NEW_LOGIN)
            .bind(session.user_id)
            .bind(SessionStatus::Active)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO sessions (
                    id, user_id, token, refresh_token, role, status, device_info,
                    expires_at, last_activity_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.token)
            .bind(&session.refresh_token)
            .bind(session.role)
            .bind(session.status)
            .bind(&session.device_info)
            .bind(session.expires_at)
            .bind(session.last_activity_at)
            .bind(session.created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE users SET last_login_at = CURRENT_TIMESTAMP WHERE id = $1")
                .bind(session.user_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await
        })
        .await
    }

    async fn get_by_token(&self, token: &str) -> anyhow::Result<Option<Session>> {
        let pool = self.pool.clone();
        let token = token.to_string();
        with_timeout(async move {
            sqlx::query_as::<_, Session>(
                r#"
                SELECT id, user_id, token, refresh_token, role, status, device_info,
                       expires_at, last_activity_at, created_at, revoked_at, revoked_reason
                FROM sessions
                WHERE token = $1
                "#,
            )
            .bind(token)
            .fetch_optional(&pool)
            .await
        })
        .await
    }

    async fn get_active_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<Session>> {
        let pool = self.pool.clone();
        with_timeout(async move {
            sqlx::query_as::<_, Session>(
                r#"
                SELECT id, user_id, token, refresh_token, role, status, device_info,
                       expires_at, last_activity_at, created_at, revoked_at, revoked_reason
                FROM sessions
                WHERE user_id = $1 AND status = $2 AND expires_at > CURRENT_TIMESTAMP
                ORDER BY created_at DESC
                LIMIT 1
                "#,
            )
            .bind(user_id)
            .bind(SessionStatus::Active)
            .fetch_optional(&pool)
            .await
        })
        .await
    }

    async fn mark_revoked(&self, token: &str, reason: &str) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        let token = token.to_string();
        let reason = reason.to_string();
        with_timeout(async move {
            sqlx::query(
                r#"
                UPDATE sessions
                SET status = $1, revoked_at = CURRENT_TIMESTAMP, revoked_reason = $2
                WHERE token = $3 AND status = $4
                "#,
            )
            .bind(SessionStatus::Revoked)
            .bind(reason)
            .bind(token)
            .bind(SessionStatus::Active)
            .execute(&pool)
            .await
            .map(|_| ())
        })
        .await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> anyhow::Result<u64> {
        let pool = self.pool.clone();
        let reason = reason.to_string();
        with_timeout(async move {
            let result = sqlx::query(
                r#"
                UPDATE sessions
                SET status = $1, revoked_at = CURRENT_TIMESTAMP, revoked_reason = $2
                WHERE user_id = $3 AND status = $4
                "#,
            )
            .bind(SessionStatus::Revoked)
            .bind(reason)
            .bind(user_id)
            .bind(SessionStatus::Active)
            .execute(&pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn delete_revoked_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        // Claim-with-lock then delete, skipping rows already locked by
        // concurrent revocations, so no batch holds locks for long.
        drain_in_batches(|| {
            let pool = self.pool.clone();
            async move {
                with_timeout(async move {
                    let result = sqlx::query(
                        r#"
                        WITH batch AS (
                            SELECT id FROM sessions
                            WHERE status = 'revoked'
                              AND revoked_at < $1
                            LIMIT $2
                            FOR UPDATE SKIP LOCKED
                        )
                        DELETE FROM sessions
                        WHERE id IN (SELECT id FROM batch)
                        "#,
                    )
                    .bind(cutoff)
                    .bind(CLEANUP_BATCH_SIZE)
                    .execute(&pool)
                    .await?;
                    Ok(result.rows_affected())
                })
                .await
            }
        })
        .await
    }
}

/// Runs `delete_batch` until it deletes fewer rows than a full batch, summing
/// the totals.
async fn drain_in_batches<F, Fut>(mut delete_batch: F) -> anyhow::Result<u64>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<u64>>,
{
    let mut total_deleted: u64 = 0;
    loop {
        let deleted = delete_batch().await?;
        total_deleted += deleted;
        if deleted < CLEANUP_BATCH_SIZE as u64 {
            break;
        }
    }
    Ok(total_deleted)
}
