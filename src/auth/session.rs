use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::auth::jwt::{JwtKeys, TokenKind};
use crate::auth::repo::SessionRepo;
use crate::auth::repo_types::{Session, UserId};
use crate::error::{AppError, AppResult};

/// Raw entropy behind every session id.
const SESSION_ID_BYTES: usize = 32;

/// Who a bearer token speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: OffsetDateTime,
}

fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// Issues, validates and revokes bearer tokens.
///
/// A token is a signed JWT naming a row in the session table. The signature
/// keeps forged ids out; the row decides whether the token is still live, so
/// revocation takes effect on the very next `authenticate`.
#[derive(Clone)]
pub struct SessionAuthenticator {
    keys: JwtKeys,
    sessions: Arc<dyn SessionRepo>,
}

impl SessionAuthenticator {
    pub fn new(keys: JwtKeys, sessions: Arc<dyn SessionRepo>) -> Self {
        Self { keys, sessions }
    }

    pub async fn issue(&self, user_id: UserId, is_admin: bool) -> AppResult<IssuedTokens> {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            id: new_session_id(),
            user_id,
            is_admin,
            issued_at: now,
            expires_at: now + self.keys.refresh_ttl.max(self.keys.access_ttl),
            revoked_at: None,
        };
        self.sessions.insert(&session).await?;

        let access_token = self
            .keys
            .sign(user_id, &session.id, TokenKind::Access, now)?;
        let refresh_token = self
            .keys
            .sign(user_id, &session.id, TokenKind::Refresh, now)?;

        info!(user_id = %user_id, is_admin, "session issued");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            access_expires_at: now + self.keys.access_ttl,
        })
    }

    /// The one place a bearer token turns into an identity.
    pub async fn authenticate(&self, token: &str) -> AppResult<Identity> {
        let claims = self.keys.verify_kind(token, TokenKind::Access).map_err(|e| {
            debug!(error = %e, "access token rejected");
            AppError::InvalidToken
        })?;

        let session = self.live_session(&claims.sid, claims.sub).await?;
        Ok(Identity {
            user_id: session.user_id,
            is_admin: session.is_admin,
        })
    }

    /// Ends the session behind `token`. Garbage, expired and already revoked
    /// tokens are accepted silently so logout can be repeated.
    pub async fn revoke(&self, token: &str) -> AppResult<()> {
        let claims = match self.keys.verify_ignoring_expiry(token) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "revoke called with unverifiable token");
                return Ok(());
            }
        };
        self.sessions
            .revoke(&claims.sid, OffsetDateTime::now_utc())
            .await?;
        info!(user_id = %claims.sub, "session revoked");
        Ok(())
    }

    /// Trades a refresh token for a fresh pair. The old session is revoked
    /// in the same step, so a refresh token works exactly once.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<(Identity, IssuedTokens)> {
        let claims = self
            .keys
            .verify_kind(refresh_token, TokenKind::Refresh)
            .map_err(|e| {
                debug!(error = %e, "refresh token rejected");
                AppError::InvalidToken
            })?;

        let old = self
            .sessions
            .take_active(&claims.sid, OffsetDateTime::now_utc())
            .await?
            .filter(|s| s.user_id == claims.sub)
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "refresh with inactive session");
                AppError::InvalidToken
            })?;

        let identity = Identity {
            user_id: old.user_id,
            is_admin: old.is_admin,
        };
        let tokens = self.issue(identity.user_id, identity.is_admin).await?;
        Ok((identity, tokens))
    }

    async fn live_session(&self, sid: &str, user_id: UserId) -> AppResult<Session> {
        let session = self
            .sessions
            .find(sid)
            .await?
            .ok_or(AppError::InvalidToken)?;
        if session.user_id != user_id || !session.is_active(OffsetDateTime::now_utc()) {
            debug!(user_id = %user_id, "session not active");
            return Err(AppError::InvalidToken);
        }
        Ok(session)
    }
}
