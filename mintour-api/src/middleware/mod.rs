pub mod auth;
pub mod timeout;

pub use auth::{admin_auth_middleware, customer_auth_middleware, CurrentUser, JwtIdentity, SessionClaims};
pub use timeout::request_timeout_middleware;
