//! Authentication Module
//! Mission: Access/refresh token lifecycle and account storage

pub mod account_store;
pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod service;

pub use account_store::AccountStore;
pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use service::{AuthError, AuthService};
