//! Session lifecycle orchestration.
//!
//! Login, logout, and validation against the dual-store layout: the Redis
//! cache is written synchronously on the request path and gates all
//! subsequent validation; the durable store is written from detached tasks
//! whose failures are logged, never surfaced. A crash between the two writes
//! loses the session from the audit trail only — accepted and logged risk.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::SessionCache;
use crate::error::AppError;
use crate::models::session::{Session, SessionResponse};
use crate::models::user::{LoginRequest, RegisterRequest, User, UserResponse, UserRole};
use crate::repositories::session::{SessionStore, REVOKED_LOGOUT, REVOKED_NEW_LOGIN};
use crate::repositories::user::UserStore;
use crate::utils::password::{hash_password, verify_password};
use crate::utils::token::generate_secure_token;

/// Returned to the client after a successful login or registration.
#[derive(Debug, serde::Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub session: SessionResponse,
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    cache: Arc<dyn SessionCache>,
    session_duration: chrono::Duration,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<dyn SessionCache>,
        session_duration: chrono::Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            cache,
            session_duration,
        }
    }

    /// Authenticates the user and issues a fresh session, enforcing the
    /// single-active-session rule by revoking any prior session first.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        let user = self
            .users
            .find_by_email(&request.email)
            .await
            .map_err(AppError::Internal)?
            .ok_or(AppError::InvalidCredentials)?;

        // Same error for a wrong password as for an unknown email: never
        // reveal which factor failed.
        let password_ok = verify_password(&request.password, &user.password_hash)
            .map_err(AppError::Internal)?;
        if !password_ok {
            return Err(AppError::InvalidCredentials);
        }

        if !user.active {
            return Err(AppError::AccountDisabled);
        }

        self.revoke_existing_session(&user).await?;

        let session = Session::new(
            user.id,
            user.role,
            generate_secure_token(),
            generate_secure_token(),
            request.device_info,
            Utc::now() + self.session_duration,
        );

        // The cache write gates all subsequent validation and must complete
        // before the response is sent.
        self.cache
            .store(&session)
            .await
            .map_err(AppError::Internal)?;

        // Durable copy is fire-and-forget: the cache is authoritative for
        // liveness, so a failed insert must not fail the login.
        let sessions = Arc::clone(&self.sessions);
        let durable = session.clone();
        tokio::spawn(async move {
            if let Err(err) = sessions.create(&durable).await {
                tracing::error!(
                    user_id = %durable.user_id,
                    "Failed to create session in database: {:?}",
                    err
                );
            }
        });

        Ok(LoginResponse {
            user: UserResponse::from(&user),
            session: SessionResponse::from(&session),
        })
    }

    /// If the cache records an active session for this user, remove its
    /// entries now and transition the durable row off the request path.
    async fn revoke_existing_session(&self, user: &User) -> Result<(), AppError> {
        let existing = match self.cache.active_token_for_user(user.id).await {
            Ok(existing) => existing,
            Err(err) => {
                // A stale record must not block a new login; the store()
                // below will surface a genuinely unavailable cache.
                tracing::warn!(user_id = %user.id, "Active-session lookup failed: {:?}", err);
                None
            }
        };

        let Some(token) = existing else {
            return Ok(());
        };

        // Best-effort: a failed delete leaves the old entries to die at
        // their TTL, and the store() below overwrites the active-token
        // pointer anyway. Never blocks the new login.
        if let Err(err) = self.cache.invalidate(&token, user.id).await {
            tracing::warn!(user_id = %user.id, "Failed to invalidate prior session: {:?}", err);
        }

        // Revoke by user rather than by token: also catches durable rows the
        // cache pointer never knew about.
        let sessions = Arc::clone(&self.sessions);
        let user_id = user.id;
        tokio::spawn(async move {
            if let Err(err) = sessions
                .revoke_all_for_user(user_id, REVOKED_NEW_LOGIN)
                .await
            {
                tracing::error!(%user_id, "Failed to revoke prior sessions: {:?}", err);
            }
        });

        Ok(())
    }

    /// Creates the account and logs it straight in.
    pub async fn register(&self, request: RegisterRequest) -> Result<LoginResponse, AppError> {
        let existing = self
            .users
            .find_by_email(&request.email)
            .await
            .map_err(AppError::Internal)?;
        if existing.is_some() {
            return Err(AppError::BadRequest(
                "Email already taken by another user. Try a different email".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password).map_err(AppError::Internal)?;
        let user = User::new(
            request.email.clone(),
            password_hash,
            request.first_name,
            request.last_name,
            UserRole::Student,
        );
        self.users.insert(&user).await.map_err(AppError::Internal)?;

        self.login(LoginRequest {
            email: request.email,
            password: request.password,
            device_info: Default::default(),
        })
        .await
    }

    /// Is the token live right now. Defers entirely to the cache; no
    /// durable-store read on the hot path.
    pub async fn validate(&self, token: &str) -> bool {
        match self.cache.validate(token).await {
            Ok(true) => self.cache.is_healthy(token).await,
            Ok(false) => false,
            Err(err) => {
                tracing::warn!("Session validation failed in cache: {:?}", err);
                false
            }
        }
    }

    /// Durable view of the user's newest live session, for profile display.
    /// Not used for validation; the durable copy may lag the cache.
    pub async fn active_session(&self, user_id: Uuid) -> Result<Option<Session>, AppError> {
        self.sessions
            .get_active_for_user(user_id)
            .await
            .map_err(AppError::Internal)
    }

    /// Removes the session from the cache and best-effort revokes the
    /// durable row. Safe to call twice for the same token.
    pub async fn logout(&self, token: &str, user_id: Uuid) -> Result<(), AppError> {
        self.cache
            .invalidate(token, user_id)
            .await
            .map_err(AppError::Internal)?;

        let sessions = Arc::clone(&self.sessions);
        let token = token.to_string();
        tokio::spawn(async move {
            if let Err(err) = sessions.mark_revoked(&token, REVOKED_LOGOUT).await {
                tracing::error!(%user_id, "Failed to revoke session on logout: {:?}", err);
            }
        });

        Ok(())
    }
}
