//! Middleware components for HTTP request processing.
//!
//! Session authentication and role checks, per-IP rate limiting, request validation and
//! security headers. Layered onto the router in [`crate::build_router`].

pub mod auth;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use auth::{CurrentUser, SessionToken};
pub use rate_limit::EndpointRateLimiter;
