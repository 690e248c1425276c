use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{CreateOrganizationRequest, UpdateOrganizationRequest},
    utils::ValidatedJson,
    AppState,
};

pub async fn create_organization(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let org = state
        .provisioner
        .create_organization(&req.name, req.write_endpoint, req.read_endpoint)
        .await?;
    Ok((StatusCode::CREATED, Json(org)))
}

pub async fn list_organizations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let orgs = state.provisioner.list_organizations().await?;
    Ok(Json(orgs))
}

pub async fn get_organization(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let org = state.provisioner.get_organization(tenant_id).await?;
    Ok(Json(org))
}

pub async fn update_organization(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let org = state
        .provisioner
        .update_organization(tenant_id, req.into())
        .await?;
    Ok(Json(org))
}

pub async fn delete_organization(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.provisioner.delete_organization(tenant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
