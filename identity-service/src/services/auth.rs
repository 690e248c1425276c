//! Credential authority: password logins and the session lifecycle.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    hash_token, normalize_email, AccountResponse, AuditAction, AuditEntry, ClientContext,
    LocalAccount, PasswordResetToken, Session, TokenPair,
};
use crate::services::{
    metrics, AuditSink, CredentialStore, JwtService, ServiceError, SessionLedger,
};
use crate::utils::{
    generate_opaque_token, hash_password, verify_dummy_password, verify_password, Password,
    PasswordHashString,
};

/// Role that grants access to organization management.
pub const ADMIN_ROLE: &str = "admin";

/// Successful login: the account, its token pair, and the grants read from the store.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub account: AccountResponse,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub roles: Vec<String>,
    pub teams: Vec<String>,
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionLedger>,
    audit: Arc<dyn AuditSink>,
    jwt: JwtService,
    password_reset_ttl: Duration,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionLedger>,
        audit: Arc<dyn AuditSink>,
        jwt: JwtService,
        password_reset_ttl: Duration,
    ) -> Self {
        Self {
            credentials,
            sessions,
            audit,
            jwt,
            password_reset_ttl,
        }
    }

    /// Write an audit entry. A failed write is logged, never surfaced.
    pub(crate) async fn record_audit(&self, entry: AuditEntry) {
        if let Err(e) = self.audit.record(&entry).await {
            tracing::error!(
                action = %entry.action,
                status = %entry.status,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }

    async fn reject_login(
        &self,
        account_id: Option<Uuid>,
        email: &str,
        client: &ClientContext,
        detail: &str,
        error: ServiceError,
    ) -> ServiceError {
        tracing::warn!(email = %email, reason = detail, "Login rejected");
        self.record_audit(AuditEntry::failure(
            AuditAction::Login,
            account_id,
            email,
            client,
            detail,
        ))
        .await;
        metrics::record_auth_event("password", "failure");
        error
    }

    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        client: &ClientContext,
    ) -> Result<LoginResponse, ServiceError> {
        let email = normalize_email(email);

        let account = match self.credentials.find_account_by_email(&email).await? {
            Some(account) => account,
            None => {
                verify_dummy_password(password);
                return Err(self
                    .reject_login(
                        None,
                        &email,
                        client,
                        "unknown email",
                        ServiceError::InvalidCredentials,
                    )
                    .await)
            }
        };

        let stored_hash = match account.password_hash.as_deref() {
            Some(hash) if account.accepts_password() => PasswordHashString::new(hash),
            _ => {
                verify_dummy_password(password);
                return Err(self
                    .reject_login(
                        Some(account.id),
                        &email,
                        client,
                        "password login on federated account",
                        ServiceError::InvalidCredentials,
                    )
                    .await)
            }
        };

        let matches = verify_password(password, &stored_hash).unwrap_or_else(|e| {
            tracing::error!(
                account_id = %account.id,
                error = %e,
                "Stored password hash is unreadable"
            );
            false
        });
        if !matches {
            return Err(self
                .reject_login(
                    Some(account.id),
                    &email,
                    client,
                    "invalid password",
                    ServiceError::InvalidCredentials,
                )
                .await);
        }

        if !account.is_active {
            return Err(self
                .reject_login(
                    Some(account.id),
                    &email,
                    client,
                    "account inactive",
                    ServiceError::AccountInactive,
                )
                .await);
        }

        let tokens = self.issue_session(&account, client).await?;
        let now = Utc::now();
        self.credentials.update_last_login(account.id, now).await?;
        self.record_audit(AuditEntry::success(
            AuditAction::Login,
            account.id,
            &email,
            client,
        ))
        .await;
        metrics::record_auth_event("password", "success");

        let grants = self.credentials.fetch_grants(account.id).await?;
        let mut account = account;
        account.last_login_at = Some(now);

        tracing::info!(account_id = %account.id, "Login succeeded");

        Ok(LoginResponse {
            account: account.into(),
            tokens,
            roles: grants.roles,
            teams: grants.teams,
        })
    }

    /// Mint an access/refresh pair and persist it as one session row.
    ///
    /// Shared by password and federated logins.
    pub async fn issue_session(
        &self,
        account: &LocalAccount,
        client: &ClientContext,
    ) -> Result<TokenPair, ServiceError> {
        let issued_at = Utc::now();
        let access_token = self
            .jwt
            .generate_access_token(account.id, &account.email, issued_at)?;
        let refresh_token = generate_opaque_token();

        let session = Session::new(
            account.id,
            &access_token,
            &refresh_token,
            client,
            issued_at,
            self.jwt.session_ttl(),
        );
        self.sessions.insert_session(&session).await?;

        tracing::debug!(account_id = %account.id, session_id = %session.id, "Session issued");

        Ok(TokenPair::new(
            access_token,
            refresh_token,
            self.jwt.session_ttl_seconds(),
        ))
    }

    /// Revoke the session behind an access token. Revoking twice is not an error.
    #[tracing::instrument(skip_all)]
    pub async fn logout(
        &self,
        access_token: &str,
        client: &ClientContext,
    ) -> Result<(), ServiceError> {
        let removed = self
            .sessions
            .delete_by_access_hash(&hash_token(access_token))
            .await?;

        let Some(session) = removed else {
            tracing::debug!("Logout for unknown session");
            return Ok(());
        };

        let email = self
            .credentials
            .find_account_by_id(session.account_id)
            .await?
            .map(|a| a.email)
            .unwrap_or_default();

        self.record_audit(AuditEntry::success(
            AuditAction::Logout,
            session.account_id,
            &email,
            client,
        ))
        .await;
        metrics::record_auth_event("logout", "success");
        tracing::info!(account_id = %session.account_id, "Session revoked");
        Ok(())
    }

    /// Exchange a refresh token for a new pair, overwriting the session row.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<TokenPair, ServiceError> {
        let old_hash = hash_token(refresh_token);

        let session = match self.sessions.find_by_refresh_hash(&old_hash).await? {
            Some(session) => session,
            None => {
                metrics::record_auth_event("refresh", "failure");
                return Err(ServiceError::InvalidToken);
            }
        };

        if session.is_expired() {
            self.sessions.delete_session(session.id).await?;
            metrics::record_auth_event("refresh", "failure");
            tracing::info!(account_id = %session.account_id, "Expired session removed on refresh");
            return Err(ServiceError::SessionExpired);
        }

        let account = match self.credentials.find_account_by_id(session.account_id).await? {
            Some(account) if account.is_active => account,
            Some(account) => {
                self.sessions.delete_session(session.id).await?;
                self.record_audit(AuditEntry::failure(
                    AuditAction::TokenRefreshed,
                    Some(account.id),
                    &account.email,
                    client,
                    "account inactive",
                ))
                .await;
                metrics::record_auth_event("refresh", "failure");
                return Err(ServiceError::AccountInactive);
            }
            None => {
                self.sessions.delete_session(session.id).await?;
                metrics::record_auth_event("refresh", "failure");
                return Err(ServiceError::InvalidToken);
            }
        };

        let issued_at = Utc::now();
        let access_token = self
            .jwt
            .generate_access_token(account.id, &account.email, issued_at)?;
        let new_refresh = generate_opaque_token();

        let mut replacement = Session::new(
            account.id,
            &access_token,
            &new_refresh,
            client,
            issued_at,
            self.jwt.session_ttl(),
        );
        replacement.id = session.id;

        if !self.sessions.replace_session(&old_hash, &replacement).await? {
            tracing::warn!(account_id = %account.id, "Refresh token already used");
            metrics::record_auth_event("refresh", "failure");
            return Err(ServiceError::InvalidToken);
        }

        self.record_audit(AuditEntry::success(
            AuditAction::TokenRefreshed,
            account.id,
            &account.email,
            client,
        ))
        .await;
        metrics::record_auth_event("refresh", "success");

        Ok(TokenPair::new(
            access_token,
            new_refresh,
            self.jwt.session_ttl_seconds(),
        ))
    }

    /// Verify an access token and confirm its session is still live.
    pub async fn validate_token(&self, access_token: &str) -> Result<Uuid, ServiceError> {
        let claims = self.jwt.validate_access_token(access_token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            ServiceError::InvalidToken
        })?;
        let account_id = claims.account_id().ok_or(ServiceError::InvalidToken)?;

        let session = self
            .sessions
            .find_by_access_hash(&hash_token(access_token))
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if session.account_id != account_id || session.is_expired() {
            return Err(ServiceError::InvalidToken);
        }

        Ok(account_id)
    }

    /// Change a local password and revoke every session of the account.
    #[tracing::instrument(skip(self, old_password, new_password, client))]
    pub async fn change_password(
        &self,
        account_id: Uuid,
        old_password: &Password,
        new_password: &Password,
        client: &ClientContext,
    ) -> Result<(), ServiceError> {
        let account = self
            .credentials
            .find_account_by_id(account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        let current = match account.password_hash.as_deref() {
            Some(hash) if account.accepts_password() => PasswordHashString::new(hash),
            _ => {
                self.record_audit(AuditEntry::failure(
                    AuditAction::PasswordChanged,
                    Some(account.id),
                    &account.email,
                    client,
                    "federated account has no password",
                ))
                .await;
                metrics::record_auth_event("password_change", "failure");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if new_password.is_blank() {
            return Err(ServiceError::Validation(
                "New password must not be empty".to_string(),
            ));
        }

        if !verify_password(old_password, &current)? {
            self.record_audit(AuditEntry::failure(
                AuditAction::PasswordChanged,
                Some(account.id),
                &account.email,
                client,
                "old password mismatch",
            ))
            .await;
            metrics::record_auth_event("password_change", "failure");
            return Err(ServiceError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password)?;
        self.credentials
            .update_password_hash(account.id, new_hash.as_str())
            .await?;
        let revoked = self.sessions.delete_all_for_account(account.id).await?;

        self.record_audit(AuditEntry::success(
            AuditAction::PasswordChanged,
            account.id,
            &account.email,
            client,
        ))
        .await;
        metrics::record_auth_event("password_change", "success");
        tracing::info!(account_id = %account.id, revoked, "Password changed, sessions revoked");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn register_account(
        &self,
        email: &str,
        name: &str,
        password: &Password,
        client: &ClientContext,
    ) -> Result<AccountResponse, ServiceError> {
        if password.is_blank() {
            return Err(ServiceError::Validation(
                "Password must not be empty".to_string(),
            ));
        }

        let hash = hash_password(password)?;
        let account = LocalAccount::new_local(email, name.trim().to_string(), hash.into_string());

        if let Err(e) = self.credentials.insert_account(&account).await {
            if matches!(e, ServiceError::EmailAlreadyRegistered) {
                self.record_audit(AuditEntry::failure(
                    AuditAction::AccountRegistered,
                    None,
                    &account.email,
                    client,
                    "email already registered",
                ))
                .await;
                metrics::record_auth_event("register", "failure");
            }
            return Err(e);
        }

        self.record_audit(AuditEntry::success(
            AuditAction::AccountRegistered,
            account.id,
            &account.email,
            client,
        ))
        .await;
        metrics::record_auth_event("register", "success");
        tracing::info!(account_id = %account.id, "Account registered");

        Ok(account.into())
    }

    /// Issue a single-use reset token for an active password account.
    ///
    /// Returns `None` for unknown, federated or inactive accounts; callers
    /// must answer the same way in every case.
    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientContext,
    ) -> Result<Option<String>, ServiceError> {
        let email = normalize_email(email);
        let account = self.credentials.find_account_by_email(&email).await?;

        let account = match account {
            Some(account) if account.accepts_password() && account.is_active => account,
            other => {
                self.record_audit(AuditEntry::failure(
                    AuditAction::PasswordResetRequested,
                    other.map(|a| a.id),
                    &email,
                    client,
                    "not eligible for password reset",
                ))
                .await;
                return Ok(None);
            }
        };

        let token = generate_opaque_token();
        let reset = PasswordResetToken::new(account.id, &token, self.password_reset_ttl);
        self.credentials.insert_password_reset(&reset).await?;

        self.record_audit(AuditEntry::success(
            AuditAction::PasswordResetRequested,
            account.id,
            &email,
            client,
        ))
        .await;
        tracing::info!(account_id = %account.id, expires_at = %reset.expires_at, "Password reset issued");

        Ok(Some(token))
    }

    /// Consume a reset token, set the new password and revoke all sessions.
    #[tracing::instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &Password,
        client: &ClientContext,
    ) -> Result<(), ServiceError> {
        if new_password.is_blank() {
            return Err(ServiceError::Validation(
                "New password must not be empty".to_string(),
            ));
        }

        let reset = self
            .credentials
            .take_password_reset(&hash_token(token))
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if reset.is_expired() {
            metrics::record_auth_event("password_reset", "failure");
            return Err(ServiceError::InvalidToken);
        }

        let account = match self.credentials.find_account_by_id(reset.account_id).await? {
            Some(account) if account.accepts_password() => account,
            _ => return Err(ServiceError::InvalidToken),
        };

        let new_hash = hash_password(new_password)?;
        self.credentials
            .update_password_hash(account.id, new_hash.as_str())
            .await?;
        let revoked = self.sessions.delete_all_for_account(account.id).await?;

        self.record_audit(AuditEntry::success(
            AuditAction::PasswordReset,
            account.id,
            &account.email,
            client,
        ))
        .await;
        metrics::record_auth_event("password_reset", "success");
        tracing::info!(account_id = %account.id, revoked, "Password reset completed");
        Ok(())
    }

    /// Whether the account holds `role` in the store's grants.
    pub async fn has_role(&self, account_id: Uuid, role: &str) -> Result<bool, ServiceError> {
        let grants = self.credentials.fetch_grants(account_id).await?;
        Ok(grants.roles.iter().any(|r| r == role))
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<AccountResponse, ServiceError> {
        self.credentials
            .find_account_by_id(account_id)
            .await?
            .map(AccountResponse::from)
            .ok_or(ServiceError::AccountNotFound)
    }
}
