//! Account management for administrators and clients

pub mod admin_api;
pub mod client_api;
