use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;

/// JWT service for access token signing and verification
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    session_ttl: Duration,
}

/// Claims for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    pub iss: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Unique per token, so two pairs minted in the same second never collide
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn account_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        tracing::info!("JWT service initialized with HS256 secret");
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            session_ttl: Duration::hours(config.session_ttl_hours),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Session lifetime in seconds (for client info)
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl.num_seconds()
    }

    /// Sign an access token valid from `issued_at` for the session TTL.
    pub fn generate_access_token(
        &self,
        account_id: Uuid,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let claims = AccessTokenClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            iss: self.issuer.clone(),
            exp: (issued_at + self.session_ttl).timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Verify signature, issuer and expiry of an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            issuer: "identity-test".to_string(),
            session_ttl_hours: 24,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let jwt = JwtService::new(&config("test-secret-that-is-long-enough-0001"));
        let account_id = Uuid::new_v4();
        let issued_at = Utc::now();
        let token = jwt
            .generate_access_token(account_id, "alice@acme.com", issued_at)
            .unwrap();

        let claims = jwt.validate_access_token(&token).unwrap();
        assert_eq!(claims.account_id(), Some(account_id));
        assert_eq!(claims.email, "alice@acme.com");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issuer = JwtService::new(&config("secret-one-secret-one-secret-one-00"));
        let verifier = JwtService::new(&config("secret-two-secret-two-secret-two-00"));
        let token = issuer
            .generate_access_token(Uuid::new_v4(), "a@b.c", Utc::now())
            .unwrap();
        assert!(verifier.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = JwtService::new(&config("test-secret-that-is-long-enough-0001"));
        let token = jwt
            .generate_access_token(Uuid::new_v4(), "a@b.c", Utc::now() - Duration::hours(25))
            .unwrap();
        assert!(jwt.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_tokens_are_unique_within_a_second() {
        let jwt = JwtService::new(&config("test-secret-that-is-long-enough-0001"));
        let id = Uuid::new_v4();
        let now = Utc::now();
        let a = jwt.generate_access_token(id, "a@b.c", now).unwrap();
        let b = jwt.generate_access_token(id, "a@b.c", now).unwrap();
        assert_ne!(a, b);
    }
}
