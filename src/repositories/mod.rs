pub mod post;
pub mod session;
pub mod user;

pub use session::{PgSessionStore, SessionStore};
pub use user::{PgUserStore, UserStore};

#[cfg(test)]
pub use session::MockSessionStore;
#[cfg(test)]
pub use user::MockUserStore;
