//! Models that represent users, authentication payloads, and role metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::session::DeviceInfo;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a user account.
pub struct User {
    pub id: Uuid,
    /// Email address used for login; unique.
    pub email: String,
    /// Argon2 hash of the user's password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    /// Inactive accounts cannot log in.
    pub active: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Supported user roles stored in the database.
pub enum UserRole {
    Superuser,
    Admin,
    Instructor,
    #[default]
    Student,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Superuser => "superuser",
            UserRole::Admin => "admin",
            UserRole::Instructor => "instructor",
            UserRole::Student => "student",
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "superuser" => Ok(UserRole::Superuser),
            "admin" => Ok(UserRole::Admin),
            "instructor" => Ok(UserRole::Instructor),
            "student" => Ok(UserRole::Student),
            // tolerate common legacy casings
            "SuperUser" | "SUPERUSER" => Ok(UserRole::Superuser),
            "Admin" | "ADMIN" => Ok(UserRole::Admin),
            "Instructor" | "INSTRUCTOR" => Ok(UserRole::Instructor),
            "Student" | "STUDENT" => Ok(UserRole::Student),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["superuser", "admin", "instructor", "student"],
            )),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
/// Payload for creating a new account.
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    /// Client metadata recorded on the new session.
    #[serde(default)]
    pub device_info: DeviceInfo,
}

#[derive(Debug, Serialize, Deserialize)]
/// Public-facing representation of a user returned by the API.
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub active: bool,
    pub email_verified: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_str().to_string(),
            active: user.active,
            email_verified: user.email_verified,
        }
    }
}

impl User {
    /// Constructs a new active user with freshly generated identifiers.
    pub fn new(
        email: String,
        password_hash: String,
        first_name: String,
        last_name: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            first_name,
            last_name,
            role,
            active: true,
            email_verified: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }
}
