pub mod auth;
pub mod organization;

pub use auth::*;
pub use organization::*;
