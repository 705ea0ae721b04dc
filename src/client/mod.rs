//! Client-side session handling: token manager, session cache and permission gate

pub mod api_client;
pub mod permission_gate;
pub mod session;

pub use api_client::{ApiClient, ClientError, PermissionSource};
pub use permission_gate::{GateError, PermissionGate, RenderPolicy, ViewState};
pub use session::{CredentialPhase, SessionHandle};
