use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    config::Environment,
    dtos::{
        ChangePasswordRequest, IntrospectRequest, IntrospectResponse, LoginRequest,
        MessageResponse, PasswordResetConfirm, PasswordResetRequest, PasswordResetRequested,
        RefreshRequest, RegisterRequest,
    },
    handlers::ClientInfo,
    middleware::AuthAccount,
    utils::{Password, ValidatedJson},
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .auth_service
        .register_account(&req.email, &req.name, &Password::new(req.password), &client)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn login(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .auth_service
        .login(&req.email, &Password::new(req.password), &client)
        .await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn logout(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    AuthAccount(account): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .logout(&account.access_token, &client)
        .await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .auth_service
        .refresh_token(&req.refresh_token, &client)
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Report whether an access token is backed by a live session.
pub async fn introspect(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IntrospectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = match state.auth_service.validate_token(&req.token).await {
        Ok(account_id) => IntrospectResponse {
            active: true,
            account_id: Some(account_id),
        },
        Err(crate::services::ServiceError::InvalidToken) => IntrospectResponse {
            active: false,
            account_id: None,
        },
        Err(e) => return Err(e.into()),
    };
    Ok(Json(res))
}

pub async fn me(
    State(state): State<AppState>,
    AuthAccount(account): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth_service.get_account(account.account_id).await?;
    Ok(Json(account))
}

pub async fn change_password(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    AuthAccount(account): AuthAccount,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .change_password(
            account.account_id,
            &Password::new(req.old_password),
            &Password::new(req.new_password),
            &client,
        )
        .await?;
    Ok(Json(MessageResponse::new(
        "Password changed. All sessions have been signed out.",
    )))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = state
        .auth_service
        .request_password_reset(&req.email, &client)
        .await?;

    let reset_token = match state.config.environment {
        Environment::Dev => token,
        Environment::Prod => None,
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(PasswordResetRequested {
            message: "If the account exists, a password reset has been issued.".to_string(),
            reset_token,
        }),
    ))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .confirm_password_reset(&req.token, &Password::new(req.new_password), &client)
        .await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}
