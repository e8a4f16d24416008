//! Session state shared by the cache and the durable store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::user::UserRole;

/// Lifecycle status of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Revoked => "revoked",
        }
    }
}

/// Client metadata captured when the session is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub os_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub browser_name: String,
    #[serde(default)]
    pub browser_version: String,
}

/// A user session. The cache copy is authoritative for liveness; the durable
/// copy is authoritative for audit history and may lag behind.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Opaque random token, the primary lookup key.
    pub token: String,
    pub refresh_token: String,
    /// Role copied from the user at login time. Not refreshed if the user's
    /// role changes mid-session; stale until re-login.
    pub role: UserRole,
    pub status: SessionStatus,
    pub device_info: Json<DeviceInfo>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        role: UserRole,
        token: String,
        refresh_token: String,
        device_info: DeviceInfo,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            refresh_token,
            role,
            status: SessionStatus::Active,
            device_info: Json(device_info),
            expires_at,
            last_activity_at: now,
            created_at: now,
            revoked_at: None,
            revoked_reason: None,
        }
    }

    /// A session is live iff it is active, unexpired, and unrevoked.
    pub fn is_live(&self) -> bool {
        self.status == SessionStatus::Active
            && Utc::now() < self.expires_at
            && self.revoked_at.is_none()
    }

    pub fn revoke(&mut self, reason: &str) {
        self.status = SessionStatus::Revoked;
        self.revoked_at = Some(Utc::now());
        self.revoked_reason = Some(reason.to_string());
    }

    pub fn touch_activity(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

/// Token material returned to the client after login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        SessionResponse {
            token: session.token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at,
        }
    }
}
