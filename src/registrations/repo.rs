use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::auth::guard::authorize_mutation;
use crate::auth::repo_types::UserId;
use crate::error::{AppError, AppResult};
use crate::registrations::repo_types::{Registration, RegistrationId};
use crate::workshops::repo_types::WorkshopId;

pub const ALREADY_REGISTERED: &str = "already registered for this workshop";
pub const WORKSHOP_FULL: &str = "workshop is full";

/// Storage for workshop sign-ups.
///
/// The owner-scoped calls follow the same order as workshop mutations:
/// `NotFound` first, `Forbidden` second, then the read or write.
#[async_trait]
pub trait RegistrationRepo: Send + Sync {
    /// `NotFound` for a missing workshop; `Conflict` when the user is already
    /// registered or `max_participants` (if non-zero) is reached.
    async fn register(
        &self,
        user: UserId,
        workshop: WorkshopId,
        at: OffsetDateTime,
    ) -> AppResult<Registration>;
    /// Returns whether a registration was removed.
    async fn cancel(&self, user: UserId, workshop: WorkshopId) -> AppResult<bool>;
    /// Creation order.
    async fn list_for_user(&self, user: UserId) -> AppResult<Vec<Registration>>;
    /// Newest first. Only the workshop owner may read it.
    async fn list_for_workshop(
        &self,
        actor: UserId,
        workshop: WorkshopId,
    ) -> AppResult<Vec<Registration>>;
    async fn set_attended(
        &self,
        actor: UserId,
        id: RegistrationId,
        attended: bool,
    ) -> AppResult<Registration>;
}

const COLUMNS: &str = "id, workshop_id, user_id, registered_at, attended";

#[derive(Clone)]
pub struct PgRegistrationRepo {
    db: PgPool,
}

impl PgRegistrationRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RegistrationRepo for PgRegistrationRepo {
    async fn register(
        &self,
        user: UserId,
        workshop: WorkshopId,
        at: OffsetDateTime,
    ) -> AppResult<Registration> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        // serializes sign-ups per workshop so the capacity check holds
        let (max_participants,): (i32,) =
            sqlx::query_as("SELECT max_participants FROM workshops WHERE id = $1 FOR UPDATE")
                .bind(workshop)
                .fetch_optional(&mut *tx)
                .await
                .context("lock workshop")?
                .ok_or(AppError::NotFound("workshop"))?;

        let (already, taken): (bool, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(BOOL_OR(user_id = $2), FALSE), COUNT(*)
              FROM registrations
             WHERE workshop_id = $1
            "#,
        )
        .bind(workshop)
        .bind(user)
        .fetch_one(&mut *tx)
        .await
        .context("count registrations")?;

        if already {
            return Err(AppError::Conflict(ALREADY_REGISTERED));
        }
        if max_participants > 0 && taken >= i64::from(max_participants) {
            return Err(AppError::Conflict(WORKSHOP_FULL));
        }

        let res = sqlx::query_as::<_, Registration>(&format!(
            r#"
            INSERT INTO registrations (user_id, workshop_id, registered_at)
            VALUES ($1, $2, $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user)
        .bind(workshop)
        .bind(at)
        .fetch_one(&mut *tx)
        .await;

        let registration = match res {
            Ok(r) => r,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::Conflict(ALREADY_REGISTERED))
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await.context("commit tx")?;
        Ok(registration)
    }

    async fn cancel(&self, user: UserId, workshop: WorkshopId) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM registrations WHERE user_id = $1 AND workshop_id = $2")
            .bind(user)
            .bind(workshop)
            .execute(&self.db)
            .await
            .context("cancel registration")?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_for_user(&self, user: UserId) -> AppResult<Vec<Registration>> {
        let rows = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {COLUMNS} FROM registrations WHERE user_id = $1 ORDER BY id ASC"
        ))
        .bind(user)
        .fetch_all(&self.db)
        .await
        .context("list registrations for user")?;
        Ok(rows)
    }

    async fn list_for_workshop(
        &self,
        actor: UserId,
        workshop: WorkshopId,
    ) -> AppResult<Vec<Registration>> {
        let (owner,): (UserId,) = sqlx::query_as("SELECT admin_id FROM workshops WHERE id = $1")
            .bind(workshop)
            .fetch_optional(&self.db)
            .await
            .context("get workshop owner")?
            .ok_or(AppError::NotFound("workshop"))?;

        authorize_mutation(actor, owner).require()?;

        let rows = sqlx::query_as::<_, Registration>(&format!(
            r#"
            SELECT {COLUMNS}
              FROM registrations
             WHERE workshop_id = $1
             ORDER BY registered_at DESC, id DESC
            "#
        ))
        .bind(workshop)
        .fetch_all(&self.db)
        .await
        .context("list participants")?;
        Ok(rows)
    }

    async fn set_attended(
        &self,
        actor: UserId,
        id: RegistrationId,
        attended: bool,
    ) -> AppResult<Registration> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let (owner,): (UserId,) = sqlx::query_as(
            r#"
            SELECT w.admin_id
              FROM registrations r
              JOIN workshops w ON w.id = r.workshop_id
             WHERE r.id = $1
               FOR UPDATE OF r
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock registration")?
        .ok_or(AppError::NotFound("registration"))?;

        authorize_mutation(actor, owner).require()?;

        let updated = sqlx::query_as::<_, Registration>(&format!(
            "UPDATE registrations SET attended = $2 WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(attended)
        .fetch_one(&mut *tx)
        .await
        .context("mark attendance")?;

        tx.commit().await.context("commit tx")?;
        Ok(updated)
    }
}
