use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Wrong password, unknown email, or a password attempt on a federated account.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is not active")]
    AccountInactive,

    /// Bad signature, revoked session, or expired token.
    #[error("Invalid token")]
    InvalidToken,

    #[error("Session expired")]
    SessionExpired,

    #[error("Provisioning failed: {0}")]
    ProvisioningFailure(String),

    #[error("Invalid or expired SSO state")]
    CsrfRejected,

    #[error("Email domain not allowed")]
    DomainNotAllowed,

    /// The email already belongs to an account with a different authentication mode.
    #[error("An account with this email already exists with a different sign-in method")]
    AccountConflict,

    #[error("Missing authorization code")]
    MissingCode,

    #[error("Organization not found")]
    OrganizationNotFound,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("SSO provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("SSO provider error: {0}")]
    ProviderError(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Redis(e) => AppError::RedisError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountInactive => {
                AppError::Forbidden(anyhow::anyhow!("Account is not active"))
            }
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            ServiceError::SessionExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Session expired"))
            }
            ServiceError::ProvisioningFailure(msg) => {
                AppError::BadGateway(format!("Provisioning failed: {}", msg))
            }
            ServiceError::CsrfRejected => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired SSO state"))
            }
            ServiceError::DomainNotAllowed => {
                AppError::Forbidden(anyhow::anyhow!("Email domain not allowed"))
            }
            ServiceError::AccountConflict => AppError::Conflict(anyhow::anyhow!(
                "An account with this email already exists with a different sign-in method"
            )),
            ServiceError::MissingCode => {
                AppError::BadRequest(anyhow::anyhow!("Missing authorization code"))
            }
            ServiceError::OrganizationNotFound => {
                AppError::NotFound(anyhow::anyhow!("Organization not found"))
            }
            ServiceError::AccountNotFound => {
                AppError::NotFound(anyhow::anyhow!("Account not found"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::ProviderUnavailable(p) => {
                AppError::NotFound(anyhow::anyhow!("SSO provider unavailable: {}", p))
            }
            ServiceError::ProviderError(msg) => AppError::BadGateway(msg),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
        }
    }
}

/// Map a unique-violation on insert to the given domain error.
pub(crate) fn on_unique_violation(err: sqlx::Error, conflict: ServiceError) -> ServiceError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => conflict,
        _ => ServiceError::Database(err),
    }
}
