//! Local account model - the platform's only credential holder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Federation provider codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FederationProvider {
    Github,
    Google,
}

impl FederationProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            FederationProvider::Github => "github",
            FederationProvider::Google => "google",
        }
    }
}

impl std::fmt::Display for FederationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FederationProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(FederationProvider::Github),
            "google" => Ok(FederationProvider::Google),
            _ => Err(format!("Unknown federation provider: {}", s)),
        }
    }
}

/// Account entity.
///
/// Exactly one of `password_hash` or `is_federated` is meaningful for
/// authentication; federated accounts never log in by password.
#[derive(Debug, Clone, FromRow)]
pub struct LocalAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_federated: bool,
    pub federation_provider: Option<String>,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LocalAccount {
    /// Create an active password account.
    pub fn new_local(email: &str, name: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name,
            password_hash: Some(password_hash),
            is_active: true,
            is_federated: false,
            federation_provider: None,
            avatar_url: None,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    /// Create an active account owned by an external identity provider.
    pub fn new_federated(
        email: &str,
        name: String,
        provider: FederationProvider,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name,
            password_hash: None,
            is_active: true,
            is_federated: true,
            federation_provider: Some(provider.as_str().to_string()),
            avatar_url,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this account may authenticate with a password at all.
    pub fn accepts_password(&self) -> bool {
        !self.is_federated && self.password_hash.is_some()
    }
}

/// Emails are compared case-insensitively; the canonical form is trimmed lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account response for API (without the password hash).
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub is_federated: bool,
    pub federation_provider: Option<String>,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<LocalAccount> for AccountResponse {
    fn from(a: LocalAccount) -> Self {
        Self {
            id: a.id,
            email: a.email,
            name: a.name,
            is_active: a.is_active,
            is_federated: a.is_federated,
            federation_provider: a.federation_provider,
            avatar_url: a.avatar_url,
            last_login_at: a.last_login_at,
        }
    }
}

/// Roles and team names granted to an account, read from the platform store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountGrants {
    pub roles: Vec<String>,
    pub teams: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federated_account_rejects_password() {
        let account = LocalAccount::new_federated(
            "Bob@Example.com",
            "Bob".to_string(),
            FederationProvider::Github,
            None,
        );
        assert_eq!(account.email, "bob@example.com");
        assert!(!account.accepts_password());
        assert_eq!(account.federation_provider.as_deref(), Some("github"));
    }

    #[test]
    fn test_local_account_accepts_password() {
        let account =
            LocalAccount::new_local("alice@acme.com", "Alice".to_string(), "$argon2id$x".into());
        assert!(account.accepts_password());
        assert!(account.is_active);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("GitHub".parse(), Ok(FederationProvider::Github));
        assert_eq!("google".parse(), Ok(FederationProvider::Google));
        assert!("gitlab".parse::<FederationProvider>().is_err());
    }
}
