use axum::{
    extract::{Path, Query, State},
    response::Redirect,
};
use service_core::error::AppError;

use crate::{dtos::SsoCallbackQuery, handlers::ClientInfo, AppState};

/// Redirect the browser to the provider's consent page.
pub async fn sso_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, AppError> {
    let url = state.sso_service.begin_login(&provider).await?;
    Ok(Redirect::to(&url))
}

/// Provider callback. Always answers with a redirect to the frontend.
pub async fn sso_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    ClientInfo(client): ClientInfo,
    Query(query): Query<SsoCallbackQuery>,
) -> Redirect {
    if let Some(error) = query.error.as_deref() {
        tracing::info!(provider = %provider, error = %error, "Provider reported callback error");
    }

    let url = state
        .sso_service
        .handle_callback(
            &provider,
            query.code.as_deref(),
            query.state.as_deref(),
            &client,
        )
        .await;
    Redirect::to(&url)
}
