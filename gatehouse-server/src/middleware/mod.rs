//! Middleware chain: request id → origin guard → rate limit → bearer auth

pub mod auth;
pub mod origin;
pub mod rate_limit;
pub mod request_id;

pub use auth::CurrentUser;
pub use request_id::RequestId;
