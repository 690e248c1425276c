//! PostgreSQL platform store for identity-service.
//!
//! Implements the credential, session, audit and registry contracts on a
//! single connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    AccountGrants, AuditEntry, LocalAccount, Organization, PasswordResetToken, Session,
};
use crate::services::error::on_unique_violation;
use crate::services::{AuditSink, CredentialStore, ServiceError, SessionLedger, TenantRegistry};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

// ==================== Credential Store ====================

#[async_trait]
impl CredentialStore for Database {
    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<LocalAccount>, ServiceError> {
        let account = sqlx::query_as::<_, LocalAccount>(
            "SELECT * FROM accounts WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn find_account_by_id(
        &self,
        account_id: Uuid,
    ) -> Result<Option<LocalAccount>, ServiceError> {
        let account = sqlx::query_as::<_, LocalAccount>("SELECT * FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn insert_account(&self, account: &LocalAccount) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, name, password_hash, is_active, is_federated,
                                  federation_provider, avatar_url, last_login_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password_hash)
        .bind(account.is_active)
        .bind(account.is_federated)
        .bind(&account.federation_provider)
        .bind(&account.avatar_url)
        .bind(account.last_login_at)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| on_unique_violation(e, ServiceError::EmailAlreadyRegistered))?;
        Ok(())
    }

    async fn update_last_login(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE accounts SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = $1 WHERE id = $2 AND is_federated = FALSE",
        )
        .bind(password_hash)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::AccountNotFound);
        }
        Ok(())
    }

    async fn set_account_active(
        &self,
        account_id: Uuid,
        active: bool,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query("UPDATE accounts SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::AccountNotFound);
        }
        Ok(())
    }

    async fn insert_password_reset(&self, token: &PasswordResetToken) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (token_hash, account_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.token_hash)
        .bind(token.account_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, ServiceError> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "DELETE FROM password_reset_tokens WHERE token_hash = $1 RETURNING *",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn fetch_grants(&self, account_id: Uuid) -> Result<AccountGrants, ServiceError> {
        let roles: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT role FROM account_roles WHERE account_id = $1 ORDER BY role",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        let teams: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.name FROM teams t
            JOIN team_members m ON m.team_id = t.id
            WHERE m.account_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(AccountGrants { roles, teams })
    }
}

// ==================== Session Ledger ====================

#[async_trait]
impl SessionLedger for Database {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, access_token_hash, refresh_token_hash,
                                  ip, user_agent, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id)
        .bind(session.account_id)
        .bind(&session.access_token_hash)
        .bind(&session.refresh_token_hash)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_access_hash(
        &self,
        access_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE access_token_hash = $1")
                .bind(access_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn find_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let session =
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE refresh_token_hash = $1")
                .bind(refresh_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn replace_session(
        &self,
        old_refresh_hash: &str,
        replacement: &Session,
    ) -> Result<bool, ServiceError> {
        // The WHERE on the old hash makes this a compare-and-swap: a second
        // refresh with the same token matches zero rows.
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET access_token_hash = $1, refresh_token_hash = $2, ip = $3, user_agent = $4,
                issued_at = $5, expires_at = $6
            WHERE id = $7 AND refresh_token_hash = $8
            "#,
        )
        .bind(&replacement.access_token_hash)
        .bind(&replacement.refresh_token_hash)
        .bind(&replacement.ip)
        .bind(&replacement.user_agent)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .bind(replacement.id)
        .bind(old_refresh_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_access_hash(
        &self,
        access_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let session = sqlx::query_as::<_, Session>(
            "DELETE FROM sessions WHERE access_token_hash = $1 RETURNING *",
        )
        .bind(access_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ==================== Audit Sink ====================

#[async_trait]
impl AuditSink for Database {
    async fn record(&self, entry: &AuditEntry) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (id, account_id, email, action, resource, resource_id,
                                       ip, user_agent, status, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(&entry.email)
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(&entry.status)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn entries_for_email(
        &self,
        email: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_entries
            WHERE LOWER(email) = LOWER($1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(email.trim())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

// ==================== Tenant Registry ====================

#[async_trait]
impl TenantRegistry for Database {
    async fn insert_organization(&self, org: &Organization) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO organizations (tenant_id, display_name, sso_enabled, write_endpoint,
                                       read_endpoint, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(org.tenant_id)
        .bind(&org.display_name)
        .bind(org.sso_enabled)
        .bind(&org.write_endpoint)
        .bind(&org.read_endpoint)
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_organization(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError> {
        let org =
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(org)
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, ServiceError> {
        let orgs = sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations ORDER BY display_name, created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(orgs)
    }

    async fn update_organization(&self, org: &Organization) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET display_name = $1, sso_enabled = $2, write_endpoint = $3, read_endpoint = $4,
                updated_at = $5
            WHERE tenant_id = $6
            "#,
        )
        .bind(&org.display_name)
        .bind(org.sso_enabled)
        .bind(&org.write_endpoint)
        .bind(&org.read_endpoint)
        .bind(org.updated_at)
        .bind(org.tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::OrganizationNotFound);
        }
        Ok(())
    }

    async fn delete_organization(&self, tenant_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM organizations WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
