use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::auth::guard::Admin;
use crate::auth::repo::UserRepo;
use crate::auth::session::Identity;
use crate::error::AppResult;
use crate::registrations::repo::RegistrationRepo;
use crate::registrations::repo_types::{Participant, Registration, RegistrationId};
use crate::workshops::repo_types::WorkshopId;

/// Sign-ups. The registering user is always the authenticated caller; owner
/// views go through an [`Admin`].
#[derive(Clone)]
pub struct RegistrationService {
    repo: Arc<dyn RegistrationRepo>,
    users: Arc<dyn UserRepo>,
}

impl RegistrationService {
    pub fn new(repo: Arc<dyn RegistrationRepo>, users: Arc<dyn UserRepo>) -> Self {
        Self { repo, users }
    }

    pub async fn register(
        &self,
        caller: &Identity,
        workshop: WorkshopId,
    ) -> AppResult<Registration> {
        let registration = self
            .repo
            .register(caller.user_id, workshop, OffsetDateTime::now_utc())
            .await?;
        info!(user_id = %caller.user_id, workshop_id = %workshop, "registered for workshop");
        Ok(registration)
    }

    /// Cancelling a registration that does not exist is not an error.
    pub async fn cancel(&self, caller: &Identity, workshop: WorkshopId) -> AppResult<()> {
        if self.repo.cancel(caller.user_id, workshop).await? {
            info!(user_id = %caller.user_id, workshop_id = %workshop, "registration cancelled");
        }
        Ok(())
    }

    pub async fn list_mine(&self, caller: &Identity) -> AppResult<Vec<Registration>> {
        self.repo.list_for_user(caller.user_id).await
    }

    pub async fn participants(
        &self,
        admin: &Admin,
        workshop: WorkshopId,
    ) -> AppResult<Vec<Participant>> {
        let registrations = self.repo.list_for_workshop(admin.user_id(), workshop).await?;
        let mut participants = Vec::with_capacity(registrations.len());
        for registration in registrations {
            match self.users.find_by_id(registration.user_id).await? {
                Some(user) => participants.push(Participant::new(registration, user.username)),
                None => warn!(registration_id = %registration.id, "registration without user"),
            }
        }
        Ok(participants)
    }

    pub async fn mark_attended(
        &self,
        admin: &Admin,
        id: RegistrationId,
        attended: bool,
    ) -> AppResult<Registration> {
        let registration = self.repo.set_attended(admin.user_id(), id, attended).await?;
        info!(registration_id = %id, attended, admin_id = %admin.user_id(), "attendance updated");
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::guard::require_admin;
    use crate::error::AppError;
    use crate::registrations::repo::{ALREADY_REGISTERED, WORKSHOP_FULL};
    use crate::state::AppState;
    use crate::workshops::repo_types::{NewWorkshop, WorkshopFilter};

    async fn admin(state: &AppState, name: &str) -> Admin {
        let id = state.credentials.register_admin(name, "admin-pw").await.unwrap();
        let tokens = state.sessions.issue(id, true).await.unwrap();
        require_admin(&state.sessions, &tokens.access_token)
            .await
            .unwrap()
    }

    async fn member(state: &AppState, name: &str) -> Identity {
        let id = state.credentials.register(name, "pw").await.unwrap();
        let tokens = state.sessions.issue(id, false).await.unwrap();
        state.sessions.authenticate(&tokens.access_token).await.unwrap()
    }

    fn payload(max_participants: i32) -> NewWorkshop {
        NewWorkshop {
            title: None,
            city: "Paris".into(),
            location: "Studio".into(),
            date: "2025-05-10".into(),
            start_time: "19:00".into(),
            end_time: None,
            style: "salsa".into(),
            difficulty: "intermediate".into(),
            instructor_name: None,
            description: None,
            max_participants,
        }
    }

    #[tokio::test]
    async fn register_cancel_and_counts() {
        let state = AppState::fake();
        let alice = admin(&state, "alice").await;
        let dana = member(&state, "dana").await;
        let eli = member(&state, "eli").await;
        let w = state.workshops.create_owned(&alice, payload(0)).await.unwrap();

        state.registrations.register(&dana, w).await.unwrap();
        state.registrations.register(&eli, w).await.unwrap();
        assert!(matches!(
            state.registrations.register(&dana, w).await,
            Err(AppError::Conflict(ALREADY_REGISTERED))
        ));

        assert_eq!(state.workshops.get_public(w).await.unwrap().participant_count, 2);
        let public = state
            .workshops
            .list_public(&WorkshopFilter::default())
            .await
            .unwrap();
        assert_eq!(public[0].participant_count, 2);
        assert_eq!(state.workshops.stats(&alice).await.unwrap().total_registrations, 2);

        state.registrations.cancel(&dana, w).await.unwrap();
        state.registrations.cancel(&dana, w).await.unwrap();
        assert_eq!(state.workshops.get_public(w).await.unwrap().participant_count, 1);
        assert!(state.registrations.list_mine(&dana).await.unwrap().is_empty());
        assert_eq!(state.registrations.list_mine(&eli).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_workshop_and_capacity() {
        let state = AppState::fake();
        let alice = admin(&state, "alice").await;
        let dana = member(&state, "dana").await;
        let eli = member(&state, "eli").await;

        assert!(matches!(
            state.registrations.register(&dana, WorkshopId(77)).await,
            Err(AppError::NotFound("workshop"))
        ));

        let w = state.workshops.create_owned(&alice, payload(1)).await.unwrap();
        state.registrations.register(&dana, w).await.unwrap();
        assert!(matches!(
            state.registrations.register(&eli, w).await,
            Err(AppError::Conflict(WORKSHOP_FULL))
        ));
    }

    #[tokio::test]
    async fn only_the_owner_sees_participants_and_marks_attendance() {
        let state = AppState::fake();
        let alice = admin(&state, "alice").await;
        let bob = admin(&state, "bob").await;
        let dana = member(&state, "dana").await;
        let w = state.workshops.create_owned(&alice, payload(0)).await.unwrap();
        let reg = state.registrations.register(&dana, w).await.unwrap();

        let list = state.registrations.participants(&alice, w).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].username, "dana");
        assert!(!list[0].attended);

        assert!(matches!(
            state.registrations.participants(&bob, w).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            state.registrations.participants(&bob, WorkshopId(404)).await,
            Err(AppError::NotFound("workshop"))
        ));
        assert!(matches!(
            state.registrations.mark_attended(&bob, reg.id, true).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            state
                .registrations
                .mark_attended(&alice, RegistrationId(404), true)
                .await,
            Err(AppError::NotFound("registration"))
        ));

        let marked = state.registrations.mark_attended(&alice, reg.id, true).await.unwrap();
        assert!(marked.attended);
        let list = state.registrations.participants(&alice, w).await.unwrap();
        assert!(list[0].attended);
    }

    #[tokio::test]
    async fn deleting_a_workshop_drops_its_registrations() {
        let state = AppState::fake();
        let alice = admin(&state, "alice").await;
        let dana = member(&state, "dana").await;
        let w = state.workshops.create_owned(&alice, payload(0)).await.unwrap();
        state.registrations.register(&dana, w).await.unwrap();

        state.workshops.delete(&alice, w).await.unwrap();
        assert!(state.registrations.list_mine(&dana).await.unwrap().is_empty());
        assert_eq!(state.workshops.stats(&alice).await.unwrap().total_registrations, 0);
    }
}
