//! Roles and permissions
//! Mission: Derive each admin's permission set from their role and enforce it

pub mod api;
pub mod permissions;
pub mod store;

pub use permissions::PermissionSet;
pub use store::{Role, RoleStore};
