use axum::{
    extract::State,
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AdminUser,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
    workshops::{
        dto::{CreateWorkshopRequest, CreatedWorkshopResponse, UpdateWorkshopRequest, WorkshopList},
        repo_types::{Workshop, WorkshopFilter, WorkshopId, WorkshopStats},
    },
};

// --- routers ---

/// Open to everyone, token or not.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/workshops", get(list_public))
        .route("/workshops/:id", get(get_workshop))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/workshops", get(list_owned).post(create_workshop))
        .route(
            "/admin/workshops/:id",
            axum::routing::put(update_workshop).delete(delete_workshop),
        )
        .route("/admin/stats", get(stats))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_public(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<WorkshopFilter>,
) -> Result<Json<WorkshopList>, AppError> {
    let workshops = state.workshops.list_public(&filter).await?;
    Ok(Json(WorkshopList { workshops }))
}

#[instrument(skip(state))]
pub async fn get_workshop(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Workshop>, AppError> {
    Ok(Json(state.workshops.get_public(WorkshopId(id)).await?))
}

#[instrument(skip(state, admin))]
pub async fn list_owned(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<WorkshopList>, AppError> {
    let workshops = state.workshops.list_owned(&admin).await?;
    Ok(Json(WorkshopList { workshops }))
}

#[instrument(skip(state, admin, body))]
pub async fn create_workshop(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<CreateWorkshopRequest>,
) -> Result<(StatusCode, HeaderMap, Json<CreatedWorkshopResponse>), AppError> {
    let new = body.validate()?;
    let id = state.workshops.create_owned(&admin, new).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/workshops/{}", id)) {
        headers.insert(LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(CreatedWorkshopResponse { id })))
}

#[instrument(skip(state, admin, body))]
pub async fn update_workshop(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateWorkshopRequest>,
) -> Result<Json<Workshop>, AppError> {
    let patch = body.validate()?;
    let workshop = state.workshops.update(&admin, WorkshopId(id), patch).await?;
    Ok(Json(workshop))
}

#[instrument(skip(state, admin))]
pub async fn delete_workshop(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.workshops.delete(&admin, WorkshopId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin))]
pub async fn stats(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<WorkshopStats>, AppError> {
    Ok(Json(state.workshops.stats(&admin).await?))
}
