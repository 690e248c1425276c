//! Persistence contracts for the identity core.
//!
//! PostgreSQL implementations live on [`super::Database`]; in-memory ones on
//! [`super::InMemoryStore`] for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AccountGrants, AuditEntry, LocalAccount, Organization, PasswordResetToken, Session,
};
use crate::services::ServiceError;

/// Local account records, password hashes and password-reset tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_account_by_email(&self, email: &str)
        -> Result<Option<LocalAccount>, ServiceError>;

    async fn find_account_by_id(&self, account_id: Uuid)
        -> Result<Option<LocalAccount>, ServiceError>;

    /// Fails with `EmailAlreadyRegistered` when the email is taken.
    async fn insert_account(&self, account: &LocalAccount) -> Result<(), ServiceError>;

    async fn update_last_login(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    async fn update_password_hash(
        &self,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError>;

    async fn set_account_active(&self, account_id: Uuid, active: bool)
        -> Result<(), ServiceError>;

    async fn insert_password_reset(&self, token: &PasswordResetToken) -> Result<(), ServiceError>;

    /// Remove and return the reset token in one step.
    async fn take_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, ServiceError>;

    async fn fetch_grants(&self, account_id: Uuid) -> Result<AccountGrants, ServiceError>;
}

/// Issued session rows and their expiry.
#[async_trait]
pub trait SessionLedger: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError>;

    async fn find_by_access_hash(&self, access_hash: &str)
        -> Result<Option<Session>, ServiceError>;

    async fn find_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> Result<Option<Session>, ServiceError>;

    /// Overwrite the row still holding `old_refresh_hash` with `replacement`.
    /// Returns `false` when no such row exists anymore (a concurrent refresh won).
    async fn replace_session(
        &self,
        old_refresh_hash: &str,
        replacement: &Session,
    ) -> Result<bool, ServiceError>;

    /// Delete the row keyed by the access token hash, returning it if it existed.
    async fn delete_by_access_hash(
        &self,
        access_hash: &str,
    ) -> Result<Option<Session>, ServiceError>;

    async fn delete_session(&self, session_id: Uuid) -> Result<(), ServiceError>;

    /// Delete every session of an account. Returns the number removed.
    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<u64, ServiceError>;
}

/// Append-only security log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), ServiceError>;

    /// Most recent entries for an email, newest first.
    async fn entries_for_email(
        &self,
        email: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, ServiceError>;
}

/// Catalog of organizations and their data store coordinates.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn insert_organization(&self, org: &Organization) -> Result<(), ServiceError>;

    async fn find_organization(&self, tenant_id: Uuid)
        -> Result<Option<Organization>, ServiceError>;

    async fn list_organizations(&self) -> Result<Vec<Organization>, ServiceError>;

    async fn update_organization(&self, org: &Organization) -> Result<(), ServiceError>;

    /// Returns `false` when no row was removed.
    async fn delete_organization(&self, tenant_id: Uuid) -> Result<bool, ServiceError>;
}
