use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::AppError,
    extract::{ApiJson, ApiPath},
    registrations::{
        dto::{AttendanceRequest, ParticipantList, RegistrationList},
        repo_types::{Registration, RegistrationId},
    },
    state::AppState,
    workshops::repo_types::WorkshopId,
};

/// Any logged-in user, acting on their own sign-ups.
pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/workshops/:id/register", post(register).delete(cancel))
        .route("/me/registrations", get(list_mine))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/workshops/:id/participants", get(participants))
        .route("/admin/registrations/:id/attended", put(mark_attended))
}

#[instrument(skip(state, caller))]
pub async fn register(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<(StatusCode, Json<Registration>), AppError> {
    let registration = state.registrations.register(&caller, WorkshopId(id)).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

#[instrument(skip(state, caller))]
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.registrations.cancel(&caller, WorkshopId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, caller))]
pub async fn list_mine(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<RegistrationList>, AppError> {
    let registrations = state.registrations.list_mine(&caller).await?;
    Ok(Json(RegistrationList { registrations }))
}

#[instrument(skip(state, admin))]
pub async fn participants(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ParticipantList>, AppError> {
    let participants = state.registrations.participants(&admin, WorkshopId(id)).await?;
    Ok(Json(ParticipantList { participants }))
}

#[instrument(skip(state, admin))]
pub async fn mark_attended(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AttendanceRequest>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .registrations
        .mark_attended(&admin, RegistrationId(id), body.attended)
        .await?;
    Ok(Json(registration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::guard::require_admin;
    use crate::auth::session::Identity;
    use crate::workshops::repo_types::NewWorkshop;

    async fn admin_user(state: &AppState, name: &str) -> AdminUser {
        let id = state.credentials.register_admin(name, "pw").await.unwrap();
        let tokens = state.sessions.issue(id, true).await.unwrap();
        AdminUser(require_admin(&state.sessions, &tokens.access_token).await.unwrap())
    }

    async fn member(state: &AppState, name: &str) -> Identity {
        let id = state.credentials.register(name, "pw").await.unwrap();
        let tokens = state.sessions.issue(id, false).await.unwrap();
        state.sessions.authenticate(&tokens.access_token).await.unwrap()
    }

    #[tokio::test]
    async fn sign_up_is_bound_to_the_caller() {
        let state = AppState::fake();
        let AdminUser(alice) = admin_user(&state, "alice").await;
        let w = state
            .workshops
            .create_owned(
                &alice,
                NewWorkshop {
                    title: None,
                    city: "Paris".into(),
                    location: "Hall".into(),
                    date: "2025-09-01".into(),
                    start_time: "20:00".into(),
                    end_time: None,
                    style: "salsa".into(),
                    difficulty: "intermediate".into(),
                    instructor_name: None,
                    description: None,
                    max_participants: 0,
                },
            )
            .await
            .unwrap();

        let dana = member(&state, "dana").await;
        let (status, Json(reg)) = register(State(state.clone()), AuthUser(dana), ApiPath(w.0))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reg.user_id, dana.user_id);
        assert_eq!(reg.workshop_id, w);

        let Json(mine) = list_mine(State(state.clone()), AuthUser(dana)).await.unwrap();
        assert_eq!(mine.registrations, vec![reg.clone()]);

        let other_admin = admin_user(&state, "root").await;
        let err = participants(State(state.clone()), other_admin, ApiPath(w.0))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(marked) = mark_attended(
            State(state.clone()),
            AdminUser(alice),
            ApiPath(reg.id.0),
            ApiJson(AttendanceRequest { attended: true }),
        )
        .await
        .unwrap();
        assert!(marked.attended);

        let status = cancel(State(state.clone()), AuthUser(dana), ApiPath(w.0))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let Json(mine) = list_mine(State(state), AuthUser(dana)).await.unwrap();
        assert!(mine.registrations.is_empty());
    }
}
