//! OAuth2 identity providers for federated login.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProviderConfig, SsoConfig};
use crate::models::{ExternalIdentity, FederationProvider};
use crate::services::ServiceError;

/// One OAuth2 authorization-code provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> FederationProvider;

    /// Where to send the browser, carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<String, ServiceError>;

    async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, ServiceError>;
}

pub type ProviderMap = HashMap<FederationProvider, Arc<dyn IdentityProvider>>;

/// Build clients for every enabled provider that has credentials.
pub fn build_providers(config: &SsoConfig) -> Result<ProviderMap, ServiceError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .user_agent(concat!("identity-service/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e))
        })?;

    let mut providers: ProviderMap = HashMap::new();
    if config.github.is_usable() {
        providers.insert(
            FederationProvider::Github,
            Arc::new(GithubProvider::new(config.github.clone(), http.clone())),
        );
    }
    if config.google.is_usable() {
        providers.insert(
            FederationProvider::Google,
            Arc::new(GoogleProvider::new(config.google.clone(), http)),
        );
    }

    tracing::info!(
        providers = ?providers.keys().map(|p| p.as_str()).collect::<Vec<_>>(),
        "SSO providers configured"
    );
    Ok(providers)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_access_token(self, provider: FederationProvider) -> Result<String, ServiceError> {
        match self.access_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(token),
            None => {
                let reason = self
                    .error_description
                    .or(self.error)
                    .unwrap_or_else(|| "no access token in response".to_string());
                tracing::warn!(provider = %provider, reason = %reason, "Token exchange rejected");
                Err(ServiceError::ProviderError(format!(
                    "{} token exchange failed: {}",
                    provider, reason
                )))
            }
        }
    }
}

fn transport_error(provider: FederationProvider, step: &str, e: reqwest::Error) -> ServiceError {
    tracing::error!(provider = %provider, step, error = %e, "Provider request failed");
    ServiceError::ProviderError(format!("{} {} failed", provider, step))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    provider: FederationProvider,
    step: &str,
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            provider = %provider,
            step,
            status = %status,
            body = %body,
            "Provider returned error status"
        );
        return Err(ServiceError::ProviderError(format!(
            "{} {} returned {}",
            provider, step, status
        )));
    }
    response
        .json()
        .await
        .map_err(|e| transport_error(provider, step, e))
}

// ==================== GitHub ====================

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";

pub struct GithubProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GithubProvider {
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

/// Build the identity from `/user`, taking the primary verified address
/// from `/user/emails` when the profile email is private.
fn github_identity(
    user: GithubUser,
    emails: &[GithubEmail],
) -> Result<ExternalIdentity, ServiceError> {
    let email = user
        .email
        .filter(|e| !e.trim().is_empty())
        .or_else(|| {
            emails
                .iter()
                .find(|e| e.primary && e.verified)
                .map(|e| e.email.clone())
        })
        .ok_or_else(|| {
            ServiceError::ProviderError("GitHub account has no verified primary email".to_string())
        })?;

    Ok(ExternalIdentity {
        subject: user.id.to_string(),
        email,
        name: user.name.or(Some(user.login)),
        avatar_url: user.avatar_url,
    })
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn kind(&self) -> FederationProvider {
        FederationProvider::Github
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            GITHUB_AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode("read:user user:email"),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(GITHUB_TOKEN_URL)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), "token exchange", e))?;

        read_json::<TokenResponse>(self.kind(), "token exchange", response)
            .await?
            .into_access_token(self.kind())
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, ServiceError> {
        let response = self
            .http
            .get(format!("{}/user", GITHUB_API_URL))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), "user lookup", e))?;
        let user: GithubUser = read_json(self.kind(), "user lookup", response).await?;

        let emails = if user.email.as_deref().map_or(true, |e| e.trim().is_empty()) {
            let response = self
                .http
                .get(format!("{}/user/emails", GITHUB_API_URL))
                .bearer_auth(access_token)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .map_err(|e| transport_error(self.kind(), "email lookup", e))?;
            read_json::<Vec<GithubEmail>>(self.kind(), "email lookup", response).await?
        } else {
            Vec::new()
        };

        github_identity(user, &emails)
    }
}

// ==================== Google ====================

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

pub struct GoogleProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

fn google_identity(info: GoogleUserInfo) -> Result<ExternalIdentity, ServiceError> {
    let email = info
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ServiceError::ProviderError("Google account has no email".to_string()))?;

    if !info.verified_email {
        return Err(ServiceError::ProviderError(
            "Google account email not verified".to_string(),
        ));
    }

    Ok(ExternalIdentity {
        subject: info.id,
        email,
        name: info.name,
        avatar_url: info.picture,
    })
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> FederationProvider {
        FederationProvider::Google
    }

    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=online&state={}",
            GOOGLE_AUTHORIZE_URL,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), "token exchange", e))?;

        read_json::<TokenResponse>(self.kind(), "token exchange", response)
            .await?
            .into_access_token(self.kind())
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<ExternalIdentity, ServiceError> {
        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), "user lookup", e))?;

        let info: GoogleUserInfo = read_json(self.kind(), "user lookup", response).await?;
        google_identity(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            client_id: "client id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://portal.example.com/auth/sso/github/callback".to_string(),
            allowed_domains: Vec::new(),
        }
    }

    #[test]
    fn test_github_authorization_url_carries_state() {
        let provider = GithubProvider::new(provider_config(), reqwest::Client::new());
        let url = provider.authorization_url("st/ate");
        assert!(url.starts_with(GITHUB_AUTHORIZE_URL));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("state=st%2Fate"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fportal.example.com"));
    }

    #[test]
    fn test_google_authorization_url_requests_code() {
        let provider = GoogleProvider::new(provider_config(), reqwest::Client::new());
        let url = provider.authorization_url("abc");
        assert!(url.starts_with(GOOGLE_AUTHORIZE_URL));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid%20email%20profile"));
    }

    #[test]
    fn test_github_private_email_falls_back_to_primary() {
        let user: GithubUser = serde_json::from_str(
            r#"{"id": 7, "login": "octo", "name": null, "email": null, "avatar_url": "https://a/7"}"#,
        )
        .unwrap();
        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[
                {"email": "old@acme.com", "primary": false, "verified": true},
                {"email": "octo@acme.com", "primary": true, "verified": true}
            ]"#,
        )
        .unwrap();

        let identity = github_identity(user, &emails).unwrap();
        assert_eq!(identity.subject, "7");
        assert_eq!(identity.email, "octo@acme.com");
        assert_eq!(identity.name.as_deref(), Some("octo"));
    }

    #[test]
    fn test_github_without_verified_email_is_rejected() {
        let user: GithubUser =
            serde_json::from_str(r#"{"id": 7, "login": "octo", "email": null}"#).unwrap();
        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[{"email": "octo@acme.com", "primary": true, "verified": false}]"#,
        )
        .unwrap();
        assert!(matches!(
            github_identity(user, &emails),
            Err(ServiceError::ProviderError(_))
        ));
    }

    #[test]
    fn test_google_userinfo_shape() {
        let info: GoogleUserInfo = serde_json::from_str(
            r#"{"id": "1099", "email": "dev@acme.com", "verified_email": true,
                "name": "Dev", "picture": "https://p/1099"}"#,
        )
        .unwrap();
        let identity = google_identity(info).unwrap();
        assert_eq!(identity.email, "dev@acme.com");
        assert_eq!(identity.avatar_url.as_deref(), Some("https://p/1099"));
    }

    #[test]
    fn test_google_unverified_email_is_rejected() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"id": "1", "email": "dev@acme.com"}"#).unwrap();
        assert!(google_identity(info).is_err());
    }

    #[test]
    fn test_token_error_response() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"error": "bad_verification_code", "error_description": "The code is incorrect"}"#,
        )
        .unwrap();
        let err = body
            .into_access_token(FederationProvider::Github)
            .unwrap_err();
        assert!(err.to_string().contains("The code is incorrect"));
    }

    #[test]
    fn test_only_usable_providers_are_built() {
        let config = SsoConfig {
            frontend_url: "http://localhost:3000/auth/callback".to_string(),
            require_state: true,
            state_ttl_seconds: 300,
            http_timeout_seconds: 5,
            github: provider_config(),
            google: ProviderConfig::default(),
        };
        let providers = build_providers(&config).unwrap();
        assert!(providers.contains_key(&FederationProvider::Github));
        assert!(!providers.contains_key(&FederationProvider::Google));
    }
}
