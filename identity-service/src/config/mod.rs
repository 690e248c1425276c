use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

use crate::models::FederationProvider;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub password_reset_ttl_minutes: i64,
    pub tenancy: TenancyConfig,
    pub sso: SsoConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    /// Fixed lifetime of a session (and of its access token), from issuance.
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Tenant store used when an organization is created without endpoints.
    pub default_write_endpoint: String,
    pub default_read_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    /// Where federated logins land, with `?token=` or `?error=`.
    pub frontend_url: String,
    /// Reject callbacks that carry no state at all.
    pub require_state: bool,
    pub state_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
    pub github: ProviderConfig,
    pub google: ProviderConfig,
}

impl SsoConfig {
    pub fn provider(&self, provider: FederationProvider) -> &ProviderConfig {
        match provider {
            FederationProvider::Github => &self.github,
            FederationProvider::Google => &self.google,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Lowercased email domains allowed to sign in; empty means any.
    pub allowed_domains: Vec<String>,
}

impl ProviderConfig {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn allows_domain(&self, domain: &str) -> bool {
        self.allowed_domains.is_empty()
            || self
                .allowed_domains
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(domain))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let database_url = get_env("DATABASE_URL", None, is_prod)?;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: database_url.clone(),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("identity-service"), is_prod)?,
                session_ttl_hours: parse_env("SESSION_TTL_HOURS", "24", is_prod)?,
            },
            password_reset_ttl_minutes: parse_env("PASSWORD_RESET_TTL_MINUTES", "60", is_prod)?,
            tenancy: TenancyConfig {
                default_write_endpoint: get_optional_env("TENANT_DEFAULT_WRITE_ENDPOINT")
                    .unwrap_or(database_url),
                default_read_endpoint: get_optional_env("TENANT_DEFAULT_READ_ENDPOINT"),
            },
            sso: SsoConfig {
                frontend_url: get_env(
                    "SSO_FRONTEND_URL",
                    Some("http://localhost:3000/auth/callback"),
                    is_prod,
                )?,
                require_state: parse_env("SSO_REQUIRE_STATE", "true", is_prod)?,
                state_ttl_seconds: parse_env("SSO_STATE_TTL_SECONDS", "300", is_prod)?,
                http_timeout_seconds: parse_env("SSO_HTTP_TIMEOUT_SECONDS", "10", is_prod)?,
                github: provider_from_env("GITHUB")?,
                google: provider_from_env("GOOGLE")?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.session_ttl_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_TTL_HOURS must be positive"
            )));
        }

        if self.password_reset_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PASSWORD_RESET_TTL_MINUTES must be positive"
            )));
        }

        if self.sso.state_ttl_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SSO_STATE_TTL_SECONDS must be positive"
            )));
        }

        if self.jwt.secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must not be empty"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 bytes in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
        }

        Ok(())
    }
}

fn provider_from_env(prefix: &str) -> Result<ProviderConfig, AppError> {
    let client_id = get_optional_env(&format!("{}_CLIENT_ID", prefix)).unwrap_or_default();
    let enabled = match get_optional_env(&format!("{}_ENABLED", prefix)) {
        Some(value) => parse_value(&format!("{}_ENABLED", prefix), &value)?,
        None => !client_id.is_empty(),
    };

    Ok(ProviderConfig {
        enabled,
        client_id,
        client_secret: get_optional_env(&format!("{}_CLIENT_SECRET", prefix)).unwrap_or_default(),
        redirect_uri: get_optional_env(&format!("{}_REDIRECT_URI", prefix)).unwrap_or_default(),
        allowed_domains: get_optional_env(&format!("{}_ALLOWED_DOMAINS", prefix))
            .map(|domains| parse_domain_list(&domains))
            .unwrap_or_default(),
    })
}

/// Split a comma separated domain list into trimmed lowercase entries.
pub fn parse_domain_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|d| d.trim().trim_start_matches('@').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    parse_value(key, &raw)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_domain_list_parsing() {
        assert_eq!(
            parse_domain_list(" Acme.com, @corp.acme.com ,,"),
            vec!["acme.com".to_string(), "corp.acme.com".to_string()]
        );
    }

    #[test]
    fn test_provider_domain_allow_list() {
        let open = ProviderConfig::default();
        assert!(open.allows_domain("anything.io"));

        let restricted = ProviderConfig {
            allowed_domains: vec!["acme.com".to_string()],
            ..Default::default()
        };
        assert!(restricted.allows_domain("ACME.com"));
        assert!(!restricted.allows_domain("evil.com"));
    }

    #[test]
    fn test_provider_requires_credentials() {
        let provider = ProviderConfig {
            enabled: true,
            client_id: "id".to_string(),
            ..Default::default()
        };
        assert!(!provider.is_usable());
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<i64>("SESSION_TTL_HOURS", "abc").unwrap_err();
        assert!(err.to_string().contains("SESSION_TTL_HOURS"));
    }
}
