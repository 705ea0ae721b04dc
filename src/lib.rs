//! Realty Backend Library
//!
//! Session tokens, accounts and role permissions for the realty platform,
//! plus the client-side token manager and permission gate.

pub mod accounts;
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod middleware;
pub mod roles;
pub mod server;
