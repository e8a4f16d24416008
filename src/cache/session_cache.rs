//! Redis-backed session cache.
//!
//! Fast path for request validation. Writes three co-expiring keys per
//! session so that the session payload, the per-user active-token pointer,
//! and the role lookup all vanish together at natural expiry:
//!
//! - `session:<token>`      -> serialized session
//! - `user_session:<uuid>`  -> active token for that user
//! - `user_role:<token>`    -> role string
//!
//! Every operation is a network call and can fail independently of the
//! session's logical state; callers on the request path must treat cache
//! failure as "not authenticated", not as a crash.

use crate::db::redis::RedisPool;
use crate::models::session::{Session, SessionStatus};
use async_trait::async_trait;
use bb8_redis::redis::{self, AsyncCommands};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Writes the session, active-token pointer, and role entries in one
    /// atomic pipeline, all with TTL equal to the session's remaining life.
    async fn store(&self, session: &Session) -> anyhow::Result<()>;

    /// Loads and deserializes the cached session, `Ok(None)` when absent.
    async fn get(&self, token: &str) -> anyhow::Result<Option<Session>>;

    /// Cheap existence check only.
    async fn validate(&self, token: &str) -> anyhow::Result<bool>;

    /// Existence plus structural check: active, unexpired, unrevoked.
    /// Swallows cache errors into `false`; the middleware degrades every
    /// failure mode to unauthorized anyway.
    async fn is_healthy(&self, token: &str) -> bool;

    /// Removes the session entry and the user's active-token pointer.
    async fn invalidate(&self, token: &str, user_id: Uuid) -> anyhow::Result<()>;

    /// The token currently recorded as the user's active session, if any.
    async fn active_token_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<String>>;
}

pub struct RedisSessionCache {
    pool: RedisPool,
}

impl RedisSessionCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn session_key(token: &str) -> String {
        format!("session:{}", token)
    }

    fn user_session_key(user_id: Uuid) -> String {
        format!("user_session:{}", user_id)
    }

    fn user_role_key(token: &str) -> String {
        format!("user_role:{}", token)
    }

    /// The single TTL shared by all three keys: seconds until the session
    /// expires. An already-expired session must not be cached at all.
    fn remaining_ttl(expires_at: DateTime<Utc>) -> anyhow::Result<u64> {
        let seconds = (expires_at - Utc::now()).num_seconds();
        if seconds <= 0 {
            anyhow::bail!("refusing to cache an already-expired session");
        }
        Ok(seconds as u64)
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn store(&self, session: &Session) -> anyhow::Result<()> {
        let span = tracing::debug_span!("redis_store_session", user_id = %session.user_id);
        let _enter = span.enter();

        let ttl_seconds = Self::remaining_ttl(session.expires_at)?;
        let payload = serde_json::to_string(session)?;
        let mut conn = self.pool.get().await?;

        redis::pipe()
            .atomic()
            .set_ex(Self::session_key(&session.token), payload, ttl_seconds)
            .set_ex(
                Self::user_session_key(session.user_id),
                &session.token,
                ttl_seconds,
            )
            .set_ex(
                Self::user_role_key(&session.token),
                session.role.as_str(),
                ttl_seconds,
            )
            .query_async::<_, ()>(&mut *conn)
            .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> anyhow::Result<Option<Session>> {
        let mut conn = self.pool.get().await?;
        let payload: Option<String> = conn.get(Self::session_key(token)).await?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn validate(&self, token: &str) -> anyhow::Result<bool> {
        let mut conn = self.pool.get().await?;
        let exists: bool = conn.exists(Self::session_key(token)).await?;
        Ok(exists)
    }

    async fn is_healthy(&self, token: &str) -> bool {
        let session = match self.get(token).await {
            Ok(Some(session)) => session,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!("Session health check failed in cache: {:?}", err);
                return false;
            }
        };

        session.status == SessionStatus::Active
            && Utc::now() < session.expires_at
            && session.revoked_at.is_none()
    }

    async fn invalidate(&self, token: &str, user_id: Uuid) -> anyhow::Result<()> {
        let span = tracing::debug_span!("redis_invalidate_session", %user_id);
        let _enter = span.enter();

        let mut conn = self.pool.get().await?;
        redis::pipe()
            .atomic()
            .del(Self::session_key(token))
            .del(Self::user_session_key(user_id))
            .del(Self::user_role_key(token))
            .query_async::<_, ()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn active_token_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let token: Option<String> = conn.get(Self::user_session_key(user_id)).await?;
        Ok(token)
    }
}
