//! In-memory implementation of the platform store contracts.
//!
//! Used by the test suite and for running the service without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    normalize_email, AccountGrants, AuditEntry, LocalAccount, Organization, PasswordResetToken,
    Session,
};
use crate::services::{AuditSink, CredentialStore, ServiceError, SessionLedger, TenantRegistry};

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, LocalAccount>,
    grants: HashMap<Uuid, AccountGrants>,
    reset_tokens: HashMap<String, PasswordResetToken>,
    sessions: HashMap<Uuid, Session>,
    audit: Vec<AuditEntry>,
    organizations: HashMap<Uuid, Organization>,
}

/// Single-process store holding accounts, sessions, audit entries and the
/// tenant registry behind one lock.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ServiceError> {
        self.state.lock().map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("In-memory store mutex poisoned: {}", e))
        })
    }

    /// Seed roles and teams for an account.
    pub fn grant(&self, account_id: Uuid, grants: AccountGrants) -> Result<(), ServiceError> {
        self.lock()?.grants.insert(account_id, grants);
        Ok(())
    }

    /// Number of live sessions for an account.
    pub fn session_count(&self, account_id: Uuid) -> Result<usize, ServiceError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .filter(|s| s.account_id == account_id)
            .count())
    }

    /// All audit entries in insertion order.
    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>, ServiceError> {
        Ok(self.lock()?.audit.clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<LocalAccount>, ServiceError> {
        let email = normalize_email(email);
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| normalize_email(&a.email) == email)
            .cloned())
    }

    async fn find_account_by_id(
        &self,
        account_id: Uuid,
    ) -> Result<Option<LocalAccount>, ServiceError> {
        Ok(self.lock()?.accounts.get(&account_id).cloned())
    }

    async fn insert_account(&self, account: &LocalAccount) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let email = normalize_email(&account.email);
        if state
            .accounts
            .values()
            .any(|a| normalize_email(&a.email) == email)
        {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_last_login(
        &self,
        account_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(account) = self.lock()?.accounts.get_mut(&account_id) {
            account.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn update_password_hash(
        &self,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        match state.accounts.get_mut(&account_id) {
            Some(account) if !account.is_federated => {
                account.password_hash = Some(password_hash.to_string());
                Ok(())
            }
            _ => Err(ServiceError::AccountNotFound),
        }
    }

    async fn set_account_active(
        &self,
        account_id: Uuid,
        active: bool,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(ServiceError::AccountNotFound)?;
        account.is_active = active;
        Ok(())
    }

    async fn insert_password_reset(&self, token: &PasswordResetToken) -> Result<(), ServiceError> {
        self.lock()?
            .reset_tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn take_password_reset(
        &self,
        token_hash: &str,
    ) -> Result<Option<PasswordResetToken>, ServiceError> {
        Ok(self.lock()?.reset_tokens.remove(token_hash))
    }

    async fn fetch_grants(&self, account_id: Uuid) -> Result<AccountGrants, ServiceError> {
        Ok(self
            .lock()?
            .grants
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SessionLedger for InMemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        self.lock()?.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_access_hash(
        &self,
        access_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .find(|s| s.access_token_hash == access_hash)
            .cloned())
    }

    async fn find_by_refresh_hash(
        &self,
        refresh_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        Ok(self
            .lock()?
            .sessions
            .values()
            .find(|s| s.refresh_token_hash == refresh_hash)
            .cloned())
    }

    async fn replace_session(
        &self,
        old_refresh_hash: &str,
        replacement: &Session,
    ) -> Result<bool, ServiceError> {
        let mut state = self.lock()?;
        match state.sessions.get_mut(&replacement.id) {
            Some(existing) if existing.refresh_token_hash == old_refresh_hash => {
                *existing = replacement.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_access_hash(
        &self,
        access_hash: &str,
    ) -> Result<Option<Session>, ServiceError> {
        let mut state = self.lock()?;
        let id = state
            .sessions
            .values()
            .find(|s| s.access_token_hash == access_hash)
            .map(|s| s.id);
        Ok(id.and_then(|id| state.sessions.remove(&id)))
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), ServiceError> {
        self.lock()?.sessions.remove(&session_id);
        Ok(())
    }

    async fn delete_all_for_account(&self, account_id: Uuid) -> Result<u64, ServiceError> {
        let mut state = self.lock()?;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.account_id != account_id);
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, entry: &AuditEntry) -> Result<(), ServiceError> {
        self.lock()?.audit.push(entry.clone());
        Ok(())
    }

    async fn entries_for_email(
        &self,
        email: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        let email = normalize_email(email);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .lock()?
            .audit
            .iter()
            .rev()
            .filter(|e| normalize_email(&e.email) == email)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TenantRegistry for InMemoryStore {
    async fn insert_organization(&self, org: &Organization) -> Result<(), ServiceError> {
        self.lock()?.organizations.insert(org.tenant_id, org.clone());
        Ok(())
    }

    async fn find_organization(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(self.lock()?.organizations.get(&tenant_id).cloned())
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>, ServiceError> {
        let mut orgs: Vec<Organization> = self.lock()?.organizations.values().cloned().collect();
        orgs.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(orgs)
    }

    async fn update_organization(&self, org: &Organization) -> Result<(), ServiceError> {
        let mut state = self.lock()?;
        match state.organizations.get_mut(&org.tenant_id) {
            Some(existing) => {
                *existing = org.clone();
                Ok(())
            }
            None => Err(ServiceError::OrganizationNotFound),
        }
    }

    async fn delete_organization(&self, tenant_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.lock()?.organizations.remove(&tenant_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientContext;
    use chrono::Duration;

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let store = InMemoryStore::new();
        let account = LocalAccount::new_local("alice@acme.com", "Alice".into(), "hash".into());
        store.insert_account(&account).await.unwrap();

        let found = store.find_account_by_email(" ALICE@acme.com ").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(account.id));

        let dup = LocalAccount::new_local("Alice@Acme.com", "Alice".into(), "hash".into());
        assert!(matches!(
            store.insert_account(&dup).await,
            Err(ServiceError::EmailAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn test_replace_session_is_compare_and_swap() {
        let store = InMemoryStore::new();
        let account_id = Uuid::new_v4();
        let client = ClientContext::default();
        let original = Session::new(account_id, "a1", "r1", &client, Utc::now(), Duration::hours(1));
        store.insert_session(&original).await.unwrap();

        let mut next = Session::new(account_id, "a2", "r2", &client, Utc::now(), Duration::hours(1));
        next.id = original.id;

        assert!(store.replace_session(&original.refresh_token_hash, &next).await.unwrap());
        assert!(!store.replace_session(&original.refresh_token_hash, &next).await.unwrap());
        assert_eq!(store.session_count(account_id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_token_is_taken_once() {
        let store = InMemoryStore::new();
        let token = PasswordResetToken::new(Uuid::new_v4(), "reset", Duration::minutes(5));
        store.insert_password_reset(&token).await.unwrap();

        assert!(store.take_password_reset(&token.token_hash).await.unwrap().is_some());
        assert!(store.take_password_reset(&token.token_hash).await.unwrap().is_none());
    }
}
