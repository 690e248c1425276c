//! HTTP handlers for identity-service.

pub mod auth;
pub mod context;
pub mod metrics;
pub mod organizations;
pub mod sso;

pub use auth::*;
pub use context::ClientInfo;
pub use organizations::*;
pub use sso::*;
