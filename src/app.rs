use std::net::SocketAddr;
use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::state::AppState;
use crate::{auth, registrations, workshops};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1",
              Router::new()
                  .merge(auth::router())
                  .merge(workshops::router())
                  .merge(registrations::router())
                  .route("/health", get(|| async { "ok" }))
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

/// Creates the configured bootstrap admin, if any.
pub async fn seed_admin(state: &AppState) -> anyhow::Result<()> {
    if let Some(seed) = &state.config.admin_seed {
        state
            .credentials
            .ensure_admin(&seed.username, &seed.password)
            .await?;
    }
    Ok(())
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
        .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminSeed;
    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let res = app
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn malformed_bodies_answer_400_with_json_error() {
        let state = AppState::fake();
        let id = state.credentials.register_admin("alice", "pw").await.unwrap();
        let tokens = state.sessions.issue(id, true).await.unwrap();
        let app = build_app(state);

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/v1/admin/workshops",
            Some(&tokens.access_token),
            serde_json::json!({
                "location": "Hall",
                "date": "2025-09-01",
                "start_time": "20:00",
                "style": "salsa"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("city"));

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/v1/auth/register",
            None,
            serde_json::json!({ "username": "dana" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("password"));

        let (status, body) = send(
            app.clone(),
            "GET",
            "/api/v1/workshops/not-a-number",
            None,
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            app,
            "GET",
            "/api/v1/workshops?date_from=garbage",
            None,
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("garbage"));
    }

    #[tokio::test]
    async fn member_signs_up_through_the_router() {
        let state = AppState::fake();
        let admin_id = state.credentials.register_admin("alice", "pw").await.unwrap();
        let admin = state.sessions.issue(admin_id, true).await.unwrap();
        let app = build_app(state);

        let (status, created) = send(
            app.clone(),
            "POST",
            "/api/v1/admin/workshops",
            Some(&admin.access_token),
            serde_json::json!({
                "city": "Paris",
                "location": "Hall",
                "date": "2025-09-01",
                "start_time": "20:00",
                "style": "salsa"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let workshop = created["id"].as_i64().unwrap();

        let (status, member) = send(
            app.clone(),
            "POST",
            "/api/v1/auth/register",
            None,
            serde_json::json!({ "username": "dana", "password": "pw" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let member_token = member["access_token"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/workshops/{workshop}/register");
        let (status, _) = send(app.clone(), "POST", &uri, None, serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, reg) =
            send(app.clone(), "POST", &uri, Some(&member_token), serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reg["user_id"], member["user"]["id"]);
        let (status, _) =
            send(app.clone(), "POST", &uri, Some(&member_token), serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, listed) = send(
            app.clone(),
            "GET",
            &format!("/api/v1/workshops/{workshop}"),
            None,
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(listed["participant_count"], 1);

        let (status, participants) = send(
            app.clone(),
            "GET",
            &format!("/api/v1/admin/workshops/{workshop}/participants"),
            Some(&admin.access_token),
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(participants["participants"][0]["username"], "dana");

        let (_, stats) = send(
            app,
            "GET",
            "/api/v1/admin/stats",
            Some(&admin.access_token),
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(stats["total_registrations"], 1);
    }

    #[tokio::test]
    async fn seed_admin_is_idempotent_and_grants_admin() {
        let base = AppState::fake();
        let mut config = (*base.config).clone();
        config.admin_seed = Some(AdminSeed {
            username: "root".into(),
            password: "bootstrap".into(),
        });
        let state = AppState::in_memory(Arc::new(config)).unwrap();

        seed_admin(&state).await.unwrap();
        seed_admin(&state).await.unwrap();
        let user = state.credentials.verify("root", "bootstrap").await.unwrap();
        assert!(user.is_admin);
    }

    #[test]
    fn router_builds() {
        let _ = build_app(AppState::fake());
    }
}
