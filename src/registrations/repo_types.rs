use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::auth::repo_types::UserId;
use crate::workshops::repo_types::WorkshopId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RegistrationId(pub i64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One user signed up for one workshop. Unique per (user, workshop).
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Registration {
    pub id: RegistrationId,
    pub workshop_id: WorkshopId,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    pub attended: bool,
}

/// A registration as the workshop owner sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub registration_id: RegistrationId,
    pub user_id: UserId,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    pub attended: bool,
}

impl Participant {
    pub fn new(registration: Registration, username: String) -> Self {
        Self {
            registration_id: registration.id,
            user_id: registration.user_id,
            username,
            registered_at: registration.registered_at,
            attended: registration.attended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_serializes_flat_ids() {
        let p = Participant::new(
            Registration {
                id: RegistrationId(3),
                workshop_id: WorkshopId(9),
                user_id: UserId(4),
                registered_at: OffsetDateTime::UNIX_EPOCH,
                attended: true,
            },
            "dana".into(),
        );
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["registration_id"], 3);
        assert_eq!(json["user_id"], 4);
        assert_eq!(json["username"], "dana");
        assert_eq!(json["registered_at"], "1970-01-01T00:00:00Z");
        assert_eq!(json["attended"], true);
    }
}
