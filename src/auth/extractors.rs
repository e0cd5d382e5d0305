use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::auth::guard::{self, Admin};
use crate::auth::session::Identity;
use crate::error::AppError;
use crate::state::AppState;

/// Raw `Authorization: Bearer <token>` value, not yet validated.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthenticated)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!("invalid auth scheme");
                AppError::Unauthenticated
            })?;

        Ok(BearerToken(token.to_string()))
    }
}

/// Any logged-in caller.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let identity = state.sessions.authenticate(&token).await?;
        Ok(AuthUser(identity))
    }
}

/// Caller holding a live admin token.
pub struct AdminUser(pub Admin);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let admin = guard::require_admin(&state.sessions, &token).await?;
        Ok(AdminUser(admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::UserId;
    use axum::http::Request;

    fn parts(auth: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/admin/workshops");
        if let Some(value) = auth {
            req = req.header(AUTHORIZATION, value);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthenticated() {
        let state = AppState::fake();
        for header in [None, Some("Basic abc"), Some("Bearer   ")] {
            let mut p = parts(header);
            assert!(matches!(
                AuthUser::from_request_parts(&mut p, &state).await,
                Err(AppError::Unauthenticated)
            ));
        }
    }

    #[tokio::test]
    async fn bearer_token_resolves_identity() {
        let state = AppState::fake();
        let tokens = state.sessions.issue(UserId(4), false).await.unwrap();
        let mut p = parts(Some(&format!("Bearer {}", tokens.access_token)));
        let AuthUser(identity) = AuthUser::from_request_parts(&mut p, &state).await.unwrap();
        assert_eq!(identity.user_id, UserId(4));
        assert!(!identity.is_admin);
    }

    #[tokio::test]
    async fn admin_extractor_checks_the_flag() {
        let state = AppState::fake();
        let user = state.sessions.issue(UserId(4), false).await.unwrap();
        let admin = state.sessions.issue(UserId(5), true).await.unwrap();

        let mut p = parts(Some(&format!("Bearer {}", user.access_token)));
        assert!(matches!(
            AdminUser::from_request_parts(&mut p, &state).await,
            Err(AppError::Forbidden(_))
        ));

        let mut p = parts(Some(&format!("Bearer {}", admin.access_token)));
        let AdminUser(granted) = AdminUser::from_request_parts(&mut p, &state).await.unwrap();
        assert_eq!(granted.user_id(), UserId(5));
    }
}
