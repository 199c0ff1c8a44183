use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::assembler::{Assembler, GangsheetRequest, Preview};
use crate::error::{GangsheetError, Result};
use crate::gangsheet::{Gangsheet, GangsheetStatusView};
use crate::render::Renderer;
use crate::types::PackingSettings;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant taken from the `X-Tenant-Id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for TenantId {
    type Rejection = GangsheetError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| TenantId(v.to_string()))
            .ok_or(GangsheetError::MissingTenant)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub id: Uuid,
    pub file_urls: Vec<String>,
}

pub fn router<R: Renderer>(assembler: Arc<Assembler<R>>) -> Router {
    Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/gangsheets", post(create::<R>).get(list::<R>))
        .route("/gangsheets/preview", post(preview::<R>))
        .route(
            "/gangsheets/settings",
            get(get_settings::<R>).put(put_settings::<R>),
        )
        .route("/gangsheets/{id}", get(fetch::<R>).delete(delete::<R>))
        .route("/gangsheets/{id}/status", get(status::<R>))
        .route("/gangsheets/{id}/download", get(download::<R>))
        .with_state(assembler)
}

async fn create<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Json(req): Json<GangsheetRequest>,
) -> Result<(StatusCode, Json<Gangsheet>)> {
    tracing::info!(tenant = %tenant, orders = req.order_ids.len(), "POST /gangsheets");
    let gangsheet = assembler.create_gangsheet(&tenant, &req)?;
    Ok((StatusCode::CREATED, Json(gangsheet)))
}

async fn preview<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Json(req): Json<GangsheetRequest>,
) -> Result<Json<Preview>> {
    tracing::info!(tenant = %tenant, orders = req.order_ids.len(), "POST /gangsheets/preview");
    assembler.preview(&tenant, &req).map(Json)
}

async fn list<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
) -> Result<Json<Vec<Gangsheet>>> {
    assembler.list_gangsheets(&tenant).map(Json)
}

async fn fetch<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<Gangsheet>> {
    assembler.get_gangsheet(&tenant, id).map(Json)
}

async fn status<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<GangsheetStatusView>> {
    assembler.get_gangsheet_status(&tenant, id).map(Json)
}

async fn download<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadResponse>> {
    let file_urls = assembler.download_gangsheet(&tenant, id)?;
    Ok(Json(DownloadResponse { id, file_urls }))
}

async fn delete<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    assembler.delete_gangsheet(&tenant, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_settings<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
) -> Result<Json<PackingSettings>> {
    assembler.settings(&tenant).map(Json)
}

async fn put_settings<R: Renderer>(
    State(assembler): State<Arc<Assembler<R>>>,
    TenantId(tenant): TenantId,
    Json(settings): Json<PackingSettings>,
) -> Result<Json<PackingSettings>> {
    assembler.update_settings(&tenant, settings).map(Json)
}
