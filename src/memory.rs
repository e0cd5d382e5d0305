//! In-process stores used when no `DATABASE_URL` is configured, and by tests.
//!
//! Each store keeps its table behind one `tokio::sync::RwLock`. Multi-step
//! operations take the write lock once and finish under it, which gives the
//! same single-writer guarantee a row lock gives in Postgres.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::auth::guard::authorize_mutation;
use crate::auth::repo::{SessionRepo, UserRepo};
use crate::auth::repo_types::{Session, User, UserId};
use crate::error::{AppError, AppResult};
use crate::registrations::repo::{RegistrationRepo, ALREADY_REGISTERED, WORKSHOP_FULL};
use crate::registrations::repo_types::{Registration, RegistrationId};
use crate::workshops::repo::WorkshopRepo;
use crate::workshops::repo_types::{
    NewWorkshop, Workshop, WorkshopFilter, WorkshopId, WorkshopPatch, WorkshopStats,
};

#[derive(Default)]
struct UserTable {
    next_id: i64,
    by_id: BTreeMap<UserId, User>,
    by_username: HashMap<String, UserId>,
}

#[derive(Default)]
pub struct MemoryUserRepo {
    inner: RwLock<UserTable>,
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, username: &str, password_hash: &str, is_admin: bool) -> AppResult<User> {
        let mut table = self.inner.write().await;
        if table.by_username.contains_key(username) {
            return Err(AppError::DuplicateUsername);
        }
        table.next_id += 1;
        let user = User {
            id: UserId(table.next_id),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_admin,
            created_at: OffsetDateTime::now_utc(),
        };
        table.by_username.insert(user.username.clone(), user.id);
        table.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let table = self.inner.read().await;
        Ok(table
            .by_username
            .get(username)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemorySessionRepo {
    inner: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionRepo for MemorySessionRepo {
    async fn insert(&self, session: &Session) -> AppResult<()> {
        let mut table = self.inner.write().await;
        if table.contains_key(&session.id) {
            return Err(anyhow::anyhow!("session id collision").into());
        }
        table.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> AppResult<Option<Session>> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn revoke(&self, id: &str, at: OffsetDateTime) -> AppResult<()> {
        if let Some(session) = self.inner.write().await.get_mut(id) {
            session.revoked_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn take_active(&self, id: &str, at: OffsetDateTime) -> AppResult<Option<Session>> {
        let mut table = self.inner.write().await;
        match table.get_mut(id) {
            Some(session) if session.is_active(at) => {
                session.revoked_at = Some(at);
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// Workshops and their registrations share one lock, so counts, capacity
/// checks and the delete cascade see a consistent view.
#[derive(Default)]
struct WorkshopTable {
    next_id: i64,
    rows: BTreeMap<WorkshopId, Workshop>,
    next_registration_id: i64,
    registrations: BTreeMap<RegistrationId, Registration>,
}

impl WorkshopTable {
    fn participant_count(&self, workshop: WorkshopId) -> i64 {
        self.registrations
            .values()
            .filter(|r| r.workshop_id == workshop)
            .count() as i64
    }

    fn counted(&self, w: &Workshop) -> Workshop {
        Workshop {
            participant_count: self.participant_count(w.id),
            ..w.clone()
        }
    }

    fn owner_of(&self, workshop: WorkshopId) -> AppResult<UserId> {
        self.rows
            .get(&workshop)
            .map(|w| w.admin_id)
            .ok_or(AppError::NotFound("workshop"))
    }
}

/// Implements both [`WorkshopRepo`] and [`RegistrationRepo`]; share one
/// instance between the two services.
#[derive(Default)]
pub struct MemoryWorkshopRepo {
    inner: RwLock<WorkshopTable>,
}

#[async_trait]
impl WorkshopRepo for MemoryWorkshopRepo {
    async fn insert(&self, owner: UserId, new: NewWorkshop) -> AppResult<Workshop> {
        let mut table = self.inner.write().await;
        table.next_id += 1;
        let workshop =
            new.into_workshop(WorkshopId(table.next_id), owner, OffsetDateTime::now_utc());
        table.rows.insert(workshop.id, workshop.clone());
        Ok(workshop)
    }

    async fn get(&self, id: WorkshopId) -> AppResult<Option<Workshop>> {
        let table = self.inner.read().await;
        Ok(table.rows.get(&id).map(|w| table.counted(w)))
    }

    async fn list_by_owner(&self, owner: UserId) -> AppResult<Vec<Workshop>> {
        let table = self.inner.read().await;
        Ok(table
            .rows
            .values()
            .filter(|w| w.admin_id == owner)
            .map(|w| table.counted(w))
            .collect())
    }

    async fn list_all(&self, filter: &WorkshopFilter) -> AppResult<Vec<Workshop>> {
        let table = self.inner.read().await;
        Ok(table
            .rows
            .values()
            .filter(|w| filter.matches(w))
            .map(|w| table.counted(w))
            .collect())
    }

    async fn update_owned(
        &self,
        actor: UserId,
        id: WorkshopId,
        patch: WorkshopPatch,
    ) -> AppResult<Workshop> {
        let mut table = self.inner.write().await;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or(AppError::NotFound("workshop"))?;
        authorize_mutation(actor, row.admin_id).require()?;
        *row = patch.applied(row)?;
        let table = &*table;
        Ok(table.counted(&table.rows[&id]))
    }

    async fn delete_owned(&self, actor: UserId, id: WorkshopId) -> AppResult<()> {
        let mut table = self.inner.write().await;
        let row = table.rows.get(&id).ok_or(AppError::NotFound("workshop"))?;
        authorize_mutation(actor, row.admin_id).require()?;
        table.rows.remove(&id);
        table.registrations.retain(|_, r| r.workshop_id != id);
        Ok(())
    }

    async fn stats_by_owner(&self, owner: UserId) -> AppResult<WorkshopStats> {
        let table = self.inner.read().await;
        let mut stats = WorkshopStats::default();
        for w in table.rows.values().filter(|w| w.admin_id == owner) {
            stats.total_workshops += 1;
            stats.total_registrations += table.participant_count(w.id);
            *stats.workshops_by_style.entry(w.style.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl RegistrationRepo for MemoryWorkshopRepo {
    async fn register(
        &self,
        user: UserId,
        workshop: WorkshopId,
        at: OffsetDateTime,
    ) -> AppResult<Registration> {
        let mut table = self.inner.write().await;
        let max = table
            .rows
            .get(&workshop)
            .map(|w| w.max_participants)
            .ok_or(AppError::NotFound("workshop"))?;
        if table
            .registrations
            .values()
            .any(|r| r.workshop_id == workshop && r.user_id == user)
        {
            return Err(AppError::Conflict(ALREADY_REGISTERED));
        }
        if max > 0 && table.participant_count(workshop) >= i64::from(max) {
            return Err(AppError::Conflict(WORKSHOP_FULL));
        }

        table.next_registration_id += 1;
        let registration = Registration {
            id: RegistrationId(table.next_registration_id),
            workshop_id: workshop,
            user_id: user,
            registered_at: at,
            attended: false,
        };
        table.registrations.insert(registration.id, registration.clone());
        Ok(registration)
    }

    async fn cancel(&self, user: UserId, workshop: WorkshopId) -> AppResult<bool> {
        let mut table = self.inner.write().await;
        let before = table.registrations.len();
        table
            .registrations
            .retain(|_, r| !(r.workshop_id == workshop && r.user_id == user));
        Ok(table.registrations.len() < before)
    }

    async fn list_for_user(&self, user: UserId) -> AppResult<Vec<Registration>> {
        let table = self.inner.read().await;
        Ok(table
            .registrations
            .values()
            .filter(|r| r.user_id == user)
            .cloned()
            .collect())
    }

    async fn list_for_workshop(
        &self,
        actor: UserId,
        workshop: WorkshopId,
    ) -> AppResult<Vec<Registration>> {
        let table = self.inner.read().await;
        authorize_mutation(actor, table.owner_of(workshop)?).require()?;
        let mut rows: Vec<Registration> = table
            .registrations
            .values()
            .filter(|r| r.workshop_id == workshop)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.registered_at, b.id).cmp(&(a.registered_at, a.id)));
        Ok(rows)
    }

    async fn set_attended(
        &self,
        actor: UserId,
        id: RegistrationId,
        attended: bool,
    ) -> AppResult<Registration> {
        let mut table = self.inner.write().await;
        let workshop = table
            .registrations
            .get(&id)
            .map(|r| r.workshop_id)
            .ok_or(AppError::NotFound("registration"))?;
        authorize_mutation(actor, table.owner_of(workshop)?).require()?;
        let registration = table
            .registrations
            .get_mut(&id)
            .ok_or(AppError::NotFound("registration"))?;
        registration.attended = attended;
        Ok(registration.clone())
    }
}
