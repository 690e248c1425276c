//! Federated login over OAuth2 with single-use CSRF state.

use chrono::Utc;
use std::sync::Arc;

use crate::config::SsoConfig;
use crate::models::{
    AuditAction, AuditEntry, ClientContext, ExternalIdentity, FederationProvider, LocalAccount,
    TokenPair,
};
use crate::services::providers::{IdentityProvider, ProviderMap};
use crate::services::redis::StateCache;
use crate::services::{metrics, AuthService, CredentialStore, ServiceError};
use crate::utils::generate_state;

#[derive(Clone)]
pub struct SsoService {
    config: SsoConfig,
    providers: Arc<ProviderMap>,
    states: Arc<dyn StateCache>,
    credentials: Arc<dyn CredentialStore>,
    auth: AuthService,
}

impl SsoService {
    pub fn new(
        config: SsoConfig,
        providers: ProviderMap,
        states: Arc<dyn StateCache>,
        credentials: Arc<dyn CredentialStore>,
        auth: AuthService,
    ) -> Self {
        Self {
            config,
            providers: Arc::new(providers),
            states,
            credentials,
            auth,
        }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn IdentityProvider>, ServiceError> {
        name.parse::<FederationProvider>()
            .ok()
            .and_then(|kind| self.providers.get(&kind))
            .ok_or_else(|| ServiceError::ProviderUnavailable(name.to_string()))
    }

    /// Store a fresh state for `provider` and return its authorization URL.
    #[tracing::instrument(skip(self))]
    pub async fn begin_login(&self, provider: &str) -> Result<String, ServiceError> {
        let provider = self.provider(provider)?;
        let state = generate_state();

        self.states
            .put_state(&state, provider.kind(), self.config.state_ttl_seconds)
            .await?;

        tracing::info!(provider = %provider.kind(), "SSO login initiated");
        Ok(provider.authorization_url(&state))
    }

    /// Finish a federated login. Always yields a frontend redirect URL,
    /// carrying either `token` or `error`.
    #[tracing::instrument(skip(self, code, state, client))]
    pub async fn handle_callback(
        &self,
        provider: &str,
        code: Option<&str>,
        state: Option<&str>,
        client: &ClientContext,
    ) -> String {
        match self.complete_login(provider, code, state, client).await {
            Ok(tokens) => {
                metrics::record_auth_event("sso", "success");
                self.redirect("token", &tokens.access_token)
            }
            Err(e) => {
                metrics::record_auth_event("sso", "failure");
                tracing::warn!(provider = %provider, error = %e, "SSO callback rejected");
                self.redirect("error", &redirect_message(&e))
            }
        }
    }

    async fn complete_login(
        &self,
        provider_name: &str,
        code: Option<&str>,
        state: Option<&str>,
        client: &ClientContext,
    ) -> Result<TokenPair, ServiceError> {
        let provider = self.provider(provider_name)?;
        let kind = provider.kind();

        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(ServiceError::MissingCode)?;

        if let Err(e) = self.verify_state(kind, state).await {
            self.audit_failure(None, "", client, &e).await;
            return Err(e);
        }

        let identity = match self.fetch_identity(provider.as_ref(), code).await {
            Ok(identity) => identity,
            Err(e) => {
                self.audit_failure(None, "", client, &e).await;
                return Err(e);
            }
        };

        let account = match self.resolve_account(kind, &identity).await {
            Ok(account) => account,
            Err(e) => {
                let account_id = match &e {
                    ServiceError::DomainNotAllowed => None,
                    _ => self
                        .credentials
                        .find_account_by_email(&identity.email)
                        .await
                        .ok()
                        .flatten()
                        .map(|a| a.id),
                };
                self.audit_failure(account_id, &identity.email, client, &e).await;
                return Err(e);
            }
        };

        let tokens = match self.start_session(&account, client).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.audit_failure(Some(account.id), &account.email, client, &e)
                    .await;
                return Err(e);
            }
        };

        self.auth
            .record_audit(
                AuditEntry::success(AuditAction::SsoLogin, account.id, &account.email, client)
                    .with_detail(kind.as_str()),
            )
            .await;
        tracing::info!(account_id = %account.id, provider = %kind, "SSO login succeeded");

        Ok(tokens)
    }

    async fn start_session(
        &self,
        account: &LocalAccount,
        client: &ClientContext,
    ) -> Result<TokenPair, ServiceError> {
        self.credentials
            .update_last_login(account.id, Utc::now())
            .await?;
        self.auth.issue_session(account, client).await
    }

    /// Consume the state entry and check it was issued for this provider.
    async fn verify_state(
        &self,
        kind: FederationProvider,
        state: Option<&str>,
    ) -> Result<(), ServiceError> {
        let state = match state.map(str::trim).filter(|s| !s.is_empty()) {
            Some(state) => state,
            None if self.config.require_state => return Err(ServiceError::CsrfRejected),
            None => {
                tracing::warn!(provider = %kind, "SSO callback without state accepted");
                return Ok(());
            }
        };

        match self.states.take_state(state).await? {
            Some(stored) if stored == kind.as_str() => Ok(()),
            Some(stored) => {
                tracing::warn!(
                    expected = %kind,
                    stored = %stored,
                    "SSO state issued for another provider"
                );
                Err(ServiceError::CsrfRejected)
            }
            None => Err(ServiceError::CsrfRejected),
        }
    }

    async fn fetch_identity(
        &self,
        provider: &dyn IdentityProvider,
        code: &str,
    ) -> Result<ExternalIdentity, ServiceError> {
        let provider_token = provider.exchange_code(code).await?;
        provider.fetch_identity(&provider_token).await
    }

    /// Apply the domain allow-list, then find or create the federated account.
    async fn resolve_account(
        &self,
        kind: FederationProvider,
        identity: &ExternalIdentity,
    ) -> Result<LocalAccount, ServiceError> {
        let settings = self.config.provider(kind);
        let domain_allowed = match identity.email_domain() {
            Some(domain) => settings.allows_domain(&domain),
            None => settings.allowed_domains.is_empty(),
        };
        if !domain_allowed {
            return Err(ServiceError::DomainNotAllowed);
        }

        let existing = match self.credentials.find_account_by_email(&identity.email).await? {
            Some(account) => account,
            None => {
                let account = LocalAccount::new_federated(
                    &identity.email,
                    identity.display_name(),
                    kind,
                    identity.avatar_url.clone(),
                );
                match self.credentials.insert_account(&account).await {
                    Ok(()) => {
                        tracing::info!(
                            account_id = %account.id,
                            provider = %kind,
                            "Federated account created"
                        );
                        return Ok(account);
                    }
                    // Lost a race with a concurrent first login for the same email.
                    Err(ServiceError::EmailAlreadyRegistered) => self
                        .credentials
                        .find_account_by_email(&identity.email)
                        .await?
                        .ok_or(ServiceError::AccountConflict)?,
                    Err(e) => return Err(e),
                }
            }
        };

        if !existing.is_federated {
            return Err(ServiceError::AccountConflict);
        }
        if !existing.is_active {
            return Err(ServiceError::AccountInactive);
        }
        Ok(existing)
    }

    async fn audit_failure(
        &self,
        account_id: Option<uuid::Uuid>,
        email: &str,
        client: &ClientContext,
        error: &ServiceError,
    ) {
        self.auth
            .record_audit(AuditEntry::failure(
                AuditAction::SsoLogin,
                account_id,
                email,
                client,
                error.to_string(),
            ))
            .await;
    }

    fn redirect(&self, key: &str, value: &str) -> String {
        let separator = if self.config.frontend_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}{}={}",
            self.config.frontend_url,
            separator,
            key,
            urlencoding::encode(value)
        )
    }
}

/// Message shown to the browser. Infrastructure errors stay generic.
fn redirect_message(error: &ServiceError) -> String {
    match error {
        ServiceError::Database(_) | ServiceError::Redis(_) | ServiceError::Internal(_) => {
            "Authentication failed".to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_errors_are_not_leaked() {
        let err = ServiceError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5"));
        assert_eq!(redirect_message(&err), "Authentication failed");
        assert_eq!(
            redirect_message(&ServiceError::DomainNotAllowed),
            "Email domain not allowed"
        );
    }
}
