pub mod auth;
pub mod rate_limit;

pub use auth::{
    extract_bearer_token, optional_auth, require_auth, require_roles, AuthContext, RoleGate,
};
pub use rate_limit::rate_limit;
