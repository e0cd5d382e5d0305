use tracing::warn;

use crate::auth::repo_types::UserId;
use crate::auth::session::{Identity, SessionAuthenticator};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn require(self) -> AppResult<()> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny => Err(AppError::Forbidden("you can only edit your own workshops")),
        }
    }
}

/// Owner-only rule for update and delete.
pub fn authorize_mutation(acting: UserId, owner: UserId) -> Access {
    if acting == owner {
        Access::Allow
    } else {
        warn!(acting = %acting, owner = %owner, "mutation of foreign workshop denied");
        Access::Deny
    }
}

/// An identity that passed the admin gate.
///
/// Only this module can build one, so holding an `Admin` means a live token
/// with the admin flag was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admin {
    user_id: UserId,
}

impl Admin {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

pub fn admin_from_identity(identity: Identity) -> AppResult<Admin> {
    if !identity.is_admin {
        warn!(user_id = %identity.user_id, "admin access required");
        return Err(AppError::Forbidden("admin access required"));
    }
    Ok(Admin {
        user_id: identity.user_id,
    })
}

pub async fn require_admin(authn: &SessionAuthenticator, token: &str) -> AppResult<Admin> {
    let identity = authn.authenticate(token).await.map_err(|e| match e {
        AppError::InvalidToken => AppError::Unauthenticated,
        other => other,
    })?;
    admin_from_identity(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn only_the_owner_may_mutate() {
        assert_eq!(authorize_mutation(UserId(1), UserId(1)), Access::Allow);
        assert_eq!(authorize_mutation(UserId(2), UserId(1)), Access::Deny);
        assert!(matches!(
            Access::Deny.require(),
            Err(AppError::Forbidden(_))
        ));
        assert!(Access::Allow.require().is_ok());
    }

    #[test]
    fn non_admin_identity_is_forbidden() {
        let err = admin_from_identity(Identity {
            user_id: UserId(3),
            is_admin: false,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden("admin access required")));
    }

    #[tokio::test]
    async fn require_admin_distinguishes_bad_token_from_missing_privilege() {
        let state = AppState::fake();

        assert!(matches!(
            require_admin(&state.sessions, "garbage").await,
            Err(AppError::Unauthenticated)
        ));

        let user = state.sessions.issue(UserId(5), false).await.unwrap();
        assert!(matches!(
            require_admin(&state.sessions, &user.access_token).await,
            Err(AppError::Forbidden(_))
        ));

        let admin = state.sessions.issue(UserId(6), true).await.unwrap();
        let granted = require_admin(&state.sessions, &admin.access_token)
            .await
            .unwrap();
        assert_eq!(granted.user_id(), UserId(6));

        state.sessions.revoke(&admin.access_token).await.unwrap();
        assert!(matches!(
            require_admin(&state.sessions, &admin.access_token).await,
            Err(AppError::Unauthenticated)
        ));
    }
}
