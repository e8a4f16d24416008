pub mod rate_limiter;
pub mod session_manager;

pub use rate_limiter::FixedWindowRateLimiter;
pub use session_manager::{LoginResponse, SessionManager};
