pub mod account;
pub mod audit_entry;
pub mod identity;
pub mod organization;
pub mod password_reset;
pub mod session;

pub use account::{
    normalize_email, AccountGrants, AccountResponse, FederationProvider, LocalAccount,
};
pub use audit_entry::{AuditAction, AuditEntry, AuditStatus};
pub use identity::ExternalIdentity;
pub use organization::{Organization, OrganizationPatch};
pub use password_reset::PasswordResetToken;
pub use session::{hash_token, ClientContext, Session, TokenPair};
