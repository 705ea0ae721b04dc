//! Middleware for observability and login throttling.
//!
//! This module provides:
//! - Request logging with a per-request span tagged by route scope
//! - Login throttling per IP and per (IP, email)

pub mod logging;
pub mod rate_limit;

pub use logging::{request_logging, RouteScope};
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
