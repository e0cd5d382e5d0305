use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
        extractors::{AuthUser, BearerToken},
        session::IssuedTokens,
    },
    error::AppError,
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn auth_response(tokens: IssuedTokens, user: PublicUser) -> Json<AuthResponse> {
    Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: tokens.access_expires_at,
        user,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let user_id = state
        .credentials
        .register(&payload.username, &payload.password)
        .await?;
    let tokens = state.sessions.issue(user_id, false).await?;

    Ok((
        StatusCode::CREATED,
        auth_response(
            tokens,
            PublicUser {
                id: user_id,
                username: payload.username,
                is_admin: false,
            },
        ),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state
        .credentials
        .verify(&payload.username, &payload.password)
        .await?;
    let tokens = state.sessions.issue(user.id, user.is_admin).await?;

    info!(user_id = %user.id, "user logged in");
    Ok(auth_response(
        tokens,
        PublicUser {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        },
    ))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let (identity, tokens) = state.sessions.refresh(&payload.refresh_token).await?;
    let user = state.credentials.find(identity.user_id).await.map_err(|e| match e {
        AppError::NotFound(_) => AppError::InvalidToken,
        other => other,
    })?;

    Ok(auth_response(
        tokens,
        PublicUser {
            id: user.id,
            username: user.username,
            is_admin: identity.is_admin,
        },
    ))
}

/// Safe to call repeatedly; unknown tokens are ignored.
#[instrument(skip(state, token))]
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, AppError> {
    state.sessions.revoke(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, identity))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.credentials.find(identity.user_id).await?;
    Ok(Json(PublicUser {
        id: user.id,
        username: user.username,
        is_admin: identity.is_admin,
    }))
}
