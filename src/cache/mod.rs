pub mod session_cache;

pub use session_cache::{RedisSessionCache, SessionCache};

#[cfg(test)]
pub use session_cache::MockSessionCache;
