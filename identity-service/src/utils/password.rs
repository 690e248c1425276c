use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

/// Plaintext password. `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// PHC-formatted Argon2 hash as stored on the account row.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id with default parameters and a fresh random salt per hash.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(hash))
}

/// Constant-time check of `password` against a stored hash.
///
/// Returns `Ok(false)` on mismatch and `Err` only for a malformed stored hash.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    let parsed = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed)
        .is_ok())
}

static DUMMY_HASH: OnceLock<Option<PasswordHashString>> = OnceLock::new();

/// Verify `password` against a fixed throwaway hash.
///
/// Called on login paths that have no stored hash to check, so an unknown
/// email costs the same Argon2 work as a wrong password.
pub fn verify_dummy_password(password: &Password) -> bool {
    let dummy = DUMMY_HASH.get_or_init(|| {
        hash_password(&Password::new("identity-service-dummy-password"))
            .map_err(|e| tracing::error!(error = %e, "Failed to compute dummy password hash"))
            .ok()
    });

    match dummy {
        Some(hash) => verify_password(password, hash).unwrap_or(false),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id() {
        let hash = hash_password(&Password::new("P@ss1")).unwrap();
        assert!(hash.as_str().starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_password() {
        let password = Password::new("P@ss1");
        let hash = hash_password(&password).unwrap();

        assert!(verify_password(&password, &hash).unwrap());
        assert!(!verify_password(&Password::new("wrong"), &hash).unwrap());
    }

    #[test]
    fn test_salt_differs_per_hash() {
        let password = Password::new("P@ss1");
        let first = hash_password(&password).unwrap();
        let second = hash_password(&password).unwrap();
        assert_ne!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let result = verify_password(&Password::new("x"), &PasswordHashString::new("not-a-hash"));
        assert!(result.is_err());
    }

    #[test]
    fn test_dummy_verification_never_matches() {
        assert!(!verify_dummy_password(&Password::new("P@ss1")));
        assert!(!verify_dummy_password(&Password::new("")));

        let dummy = DUMMY_HASH.get().and_then(Option::as_ref).unwrap();
        assert!(dummy.as_str().starts_with("$argon2id$"));
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let rendered = format!("{:?}", Password::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
