pub mod auth;
pub mod posts;
pub mod server;
pub mod users;
