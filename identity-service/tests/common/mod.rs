//! Shared setup for identity-service integration tests.
//!
//! Everything runs over the in-memory stores, so no PostgreSQL or Redis is
//! needed unless a test is explicitly marked `#[ignore]`.

#![allow(dead_code)]

use async_trait::async_trait;
use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, IdentityConfig, JwtConfig, ProviderConfig, RedisConfig,
        SecurityConfig, SsoConfig, TenancyConfig,
    },
    models::{ClientContext, ExternalIdentity, FederationProvider, LocalAccount},
    services::{
        AuthService, CredentialStore, IdentityProvider, InMemoryStateCache, InMemoryStore,
        InMemoryTenantDatabase, JwtService, ProviderMap, ServiceError, SsoService,
        TenantProvisioner,
    },
    utils::{hash_password, Password},
    AppState,
};
use std::sync::{Arc, Mutex};

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-identity-service-tests";
pub const TEST_FRONTEND_URL: &str = "http://localhost:3000/auth/callback";
pub const TEST_TENANT_ENDPOINT: &str = "postgres://tenants.test/platform";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://localhost/identity_test".to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            issuer: "identity-service-test".to_string(),
            session_ttl_hours: 24,
        },
        password_reset_ttl_minutes: 60,
        tenancy: TenancyConfig {
            default_write_endpoint: TEST_TENANT_ENDPOINT.to_string(),
            default_read_endpoint: None,
        },
        sso: SsoConfig {
            frontend_url: TEST_FRONTEND_URL.to_string(),
            require_state: true,
            state_ttl_seconds: 300,
            http_timeout_seconds: 5,
            github: provider_config(&[]),
            google: provider_config(&["acme.com"]),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

fn provider_config(domains: &[&str]) -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_uri: "http://localhost:8080/auth/sso/callback".to_string(),
        allowed_domains: domains.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn client() -> ClientContext {
    ClientContext::new(Some("203.0.113.7".to_string()), Some("test-agent".to_string()))
}

/// Provider double: hands back whatever identity (or error) the test scripted.
pub struct ScriptedProvider {
    kind: FederationProvider,
    identity: Mutex<Option<ExternalIdentity>>,
}

impl ScriptedProvider {
    pub fn new(kind: FederationProvider) -> Self {
        Self {
            kind,
            identity: Mutex::new(None),
        }
    }

    pub fn returns(&self, email: &str, name: Option<&str>) {
        *self.identity.lock().unwrap() = Some(ExternalIdentity {
            subject: format!("{}-subject", self.kind),
            email: email.to_string(),
            name: name.map(str::to_string),
            avatar_url: None,
        });
    }

    pub fn fails(&self) {
        *self.identity.lock().unwrap() = None;
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn kind(&self) -> FederationProvider {
        self.kind
    }

    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.test/{}/authorize?state={}", self.kind, state)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, ServiceError> {
        Ok(format!("provider-token-{}", code))
    }

    async fn fetch_identity(&self, _access_token: &str) -> Result<ExternalIdentity, ServiceError> {
        self.identity
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ServiceError::ProviderError("identity endpoint unavailable".to_string()))
    }
}

pub struct TestContext {
    pub config: IdentityConfig,
    pub store: Arc<InMemoryStore>,
    pub states: Arc<InMemoryStateCache>,
    pub tenants: InMemoryTenantDatabase,
    pub github: Arc<ScriptedProvider>,
    pub google: Arc<ScriptedProvider>,
    pub auth: AuthService,
    pub sso: SsoService,
    pub provisioner: TenantProvisioner,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: IdentityConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let states = Arc::new(InMemoryStateCache::new());
        let tenants = InMemoryTenantDatabase::new();
        let github = Arc::new(ScriptedProvider::new(FederationProvider::Github));
        let google = Arc::new(ScriptedProvider::new(FederationProvider::Google));

        let mut providers: ProviderMap = ProviderMap::new();
        providers.insert(FederationProvider::Github, github.clone());
        providers.insert(FederationProvider::Google, google.clone());

        let auth = AuthService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            JwtService::new(&config.jwt),
            chrono::Duration::minutes(config.password_reset_ttl_minutes),
        );
        let sso = SsoService::new(
            config.sso.clone(),
            providers,
            states.clone(),
            store.clone(),
            auth.clone(),
        );
        let provisioner = TenantProvisioner::new(
            store.clone(),
            Arc::new(tenants.clone()),
            config.tenancy.clone(),
        );

        Self {
            config,
            store,
            states,
            tenants,
            github,
            google,
            auth,
            sso,
            provisioner,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            auth_service: self.auth.clone(),
            sso_service: self.sso.clone(),
            provisioner: self.provisioner.clone(),
            db: None,
            states: self.states.clone(),
        }
    }

    pub async fn router(&self) -> axum::Router {
        build_router(self.app_state())
            .await
            .expect("Failed to build router")
    }

    /// Insert an active password account directly into the store.
    pub async fn seed_account(&self, email: &str, password: &str) -> LocalAccount {
        let hash = hash_password(&Password::new(password)).expect("Failed to hash password");
        let account = LocalAccount::new_local(email, "Test User".to_string(), hash.into_string());
        self.store
            .insert_account(&account)
            .await
            .expect("Failed to insert account");
        account
    }

    pub async fn seed_federated(
        &self,
        email: &str,
        provider: FederationProvider,
    ) -> LocalAccount {
        let account = LocalAccount::new_federated(email, "Federated".to_string(), provider, None);
        self.store
            .insert_account(&account)
            .await
            .expect("Failed to insert account");
        account
    }
}

/// Pull the `state` parameter back out of an authorization URL.
pub fn state_from_url(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .expect("authorization URL carries a state")
        .split('&')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Split a frontend redirect into its `token` or `error` query value.
pub fn redirect_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| {
            urlencoding::decode(v)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| v.to_string())
        })
    })
}
