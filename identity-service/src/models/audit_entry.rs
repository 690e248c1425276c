//! Audit entry model - append-only security log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ClientContext;

/// Audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccountRegistered,
    Login,
    SsoLogin,
    Logout,
    TokenRefreshed,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountRegistered => "account_registered",
            AuditAction::Login => "login",
            AuditAction::SsoLogin => "sso_login",
            AuditAction::Logout => "logout",
            AuditAction::TokenRefreshed => "token_refreshed",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::PasswordResetRequested => "password_reset_requested",
            AuditAction::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failure => "failure",
        }
    }
}

/// Audit entry entity. Never updated or deleted by this service.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        status: AuditStatus,
        account_id: Option<Uuid>,
        email: &str,
        client: &ClientContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            email: email.to_string(),
            action: action.as_str().to_string(),
            resource: "account".to_string(),
            resource_id: account_id.map(|id| id.to_string()),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            status: status.as_str().to_string(),
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn success(
        action: AuditAction,
        account_id: Uuid,
        email: &str,
        client: &ClientContext,
    ) -> Self {
        Self::new(action, AuditStatus::Success, Some(account_id), email, client)
    }

    pub fn failure(
        action: AuditAction,
        account_id: Option<Uuid>,
        email: &str,
        client: &ClientContext,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(action, AuditStatus::Failure, account_id, email, client).with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
