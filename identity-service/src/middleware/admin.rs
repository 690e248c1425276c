use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::middleware::AuthenticatedAccount;
use crate::services::ADMIN_ROLE;
use crate::AppState;

/// Middleware to restrict a route to accounts holding the admin role.
///
/// Must run inside [`super::auth_middleware`], which sets the caller identity.
pub async fn admin_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let account_id = req
        .extensions()
        .get::<AuthenticatedAccount>()
        .map(|caller| caller.account_id)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

    if !state.auth_service.has_role(account_id, ADMIN_ROLE).await? {
        tracing::warn!(account_id = %account_id, "Admin route denied");
        return Err(AppError::Forbidden(anyhow::anyhow!("Admin role required")));
    }

    Ok(next.run(req).await)
}
