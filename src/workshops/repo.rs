use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::auth::guard::authorize_mutation;
use crate::auth::repo_types::UserId;
use crate::error::{AppError, AppResult};
use crate::workshops::repo_types::{
    NewWorkshop, Workshop, WorkshopFilter, WorkshopId, WorkshopPatch, WorkshopStats,
};

/// Storage for workshops.
///
/// `update_owned` and `delete_owned` run existence check, ownership check and
/// write as one unit per workshop id: `NotFound` first, `Forbidden` second,
/// and nothing is written unless both pass.
#[async_trait]
pub trait WorkshopRepo: Send + Sync {
    async fn insert(&self, owner: UserId, new: NewWorkshop) -> AppResult<Workshop>;
    async fn get(&self, id: WorkshopId) -> AppResult<Option<Workshop>>;
    /// Creation order.
    async fn list_by_owner(&self, owner: UserId) -> AppResult<Vec<Workshop>>;
    /// Every owner, creation order.
    async fn list_all(&self, filter: &WorkshopFilter) -> AppResult<Vec<Workshop>>;
    async fn update_owned(
        &self,
        actor: UserId,
        id: WorkshopId,
        patch: WorkshopPatch,
    ) -> AppResult<Workshop>;
    async fn delete_owned(&self, actor: UserId, id: WorkshopId) -> AppResult<()>;
    async fn stats_by_owner(&self, owner: UserId) -> AppResult<WorkshopStats>;
}

const COLUMNS: &str = "id, admin_id, title, city, location, date, start_time, end_time, style, \
                       difficulty, instructor_name, description, max_participants, created_at";

/// `COLUMNS` plus the live registration count, over `workshops w`.
const SELECT_COUNTED: &str = "SELECT id, admin_id, title, city, location, date, start_time, \
                              end_time, style, difficulty, instructor_name, description, \
                              max_participants, created_at, \
                              (SELECT COUNT(*) FROM registrations r WHERE r.workshop_id = w.id) \
                              AS participant_count \
                              FROM workshops w";

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(Clone)]
pub struct PgWorkshopRepo {
    db: PgPool,
}

impl PgWorkshopRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WorkshopRepo for PgWorkshopRepo {
    async fn insert(&self, owner: UserId, new: NewWorkshop) -> AppResult<Workshop> {
        let workshop = sqlx::query_as::<_, Workshop>(&format!(
            r#"
            INSERT INTO workshops (admin_id, title, city, location, date, start_time,
                                   end_time, style, difficulty, instructor_name, description,
                                   max_participants)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(new.title)
        .bind(new.city)
        .bind(new.location)
        .bind(new.date)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.style)
        .bind(new.difficulty)
        .bind(new.instructor_name)
        .bind(new.description)
        .bind(new.max_participants)
        .fetch_one(&self.db)
        .await
        .context("insert workshop")?;
        Ok(workshop)
    }

    async fn get(&self, id: WorkshopId) -> AppResult<Option<Workshop>> {
        let row = sqlx::query_as::<_, Workshop>(&format!("{SELECT_COUNTED} WHERE w.id = $1"))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("get workshop")?;
        Ok(row)
    }

    async fn list_by_owner(&self, owner: UserId) -> AppResult<Vec<Workshop>> {
        let rows = sqlx::query_as::<_, Workshop>(&format!(
            "{SELECT_COUNTED} WHERE w.admin_id = $1 ORDER BY w.id ASC"
        ))
        .bind(owner)
        .fetch_all(&self.db)
        .await
        .context("list workshops by owner")?;
        Ok(rows)
    }

    async fn list_all(&self, filter: &WorkshopFilter) -> AppResult<Vec<Workshop>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("{SELECT_COUNTED} WHERE TRUE"));
        if let Some(style) = &filter.style {
            qb.push(" AND style = ").push_bind(style.clone());
        }
        if let Some(city) = &filter.city {
            qb.push(" AND city ILIKE ")
                .push_bind(format!("%{}%", escape_like(city)));
        }
        if let Some(difficulty) = &filter.difficulty {
            qb.push(" AND difficulty = ").push_bind(difficulty.clone());
        }
        if let Some(from) = &filter.date_from {
            qb.push(" AND date >= ").push_bind(from.clone());
        }
        if let Some(to) = &filter.date_to {
            qb.push(" AND date <= ").push_bind(to.clone());
        }
        qb.push(" ORDER BY w.id ASC");

        let rows = qb
            .build_query_as::<Workshop>()
            .fetch_all(&self.db)
            .await
            .context("list workshops")?;
        Ok(rows)
    }

    async fn update_owned(
        &self,
        actor: UserId,
        id: WorkshopId,
        patch: WorkshopPatch,
    ) -> AppResult<Workshop> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let current = sqlx::query_as::<_, Workshop>(&format!(
            "SELECT {COLUMNS} FROM workshops WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("lock workshop")?
        .ok_or(AppError::NotFound("workshop"))?;

        authorize_mutation(actor, current.admin_id).require()?;
        let next = patch.applied(&current)?;

        sqlx::query(
            r#"
            UPDATE workshops
               SET title = $2, city = $3, location = $4, date = $5, start_time = $6,
                   end_time = $7, style = $8, difficulty = $9, instructor_name = $10,
                   description = $11, max_participants = $12
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.title)
        .bind(next.city)
        .bind(next.location)
        .bind(next.date)
        .bind(next.start_time)
        .bind(next.end_time)
        .bind(next.style)
        .bind(next.difficulty)
        .bind(next.instructor_name)
        .bind(next.description)
        .bind(next.max_participants)
        .execute(&mut *tx)
        .await
        .context("update workshop")?;

        let updated = sqlx::query_as::<_, Workshop>(&format!("{SELECT_COUNTED} WHERE w.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .context("reload workshop")?;

        tx.commit().await.context("commit tx")?;
        Ok(updated)
    }

    async fn delete_owned(&self, actor: UserId, id: WorkshopId) -> AppResult<()> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let (owner,): (UserId,) =
            sqlx::query_as("SELECT admin_id FROM workshops WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("lock workshop")?
                .ok_or(AppError::NotFound("workshop"))?;

        authorize_mutation(actor, owner).require()?;

        sqlx::query("DELETE FROM workshops WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete workshop")?;

        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn stats_by_owner(&self, owner: UserId) -> AppResult<WorkshopStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT style, COUNT(*)
              FROM workshops
             WHERE admin_id = $1
             GROUP BY style
            "#,
        )
        .bind(owner)
        .fetch_all(&self.db)
        .await
        .context("workshop stats")?;

        let (total_registrations,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
              FROM registrations r
              JOIN workshops w ON w.id = r.workshop_id
             WHERE w.admin_id = $1
            "#,
        )
        .bind(owner)
        .fetch_one(&self.db)
        .await
        .context("registration stats")?;

        let mut stats = WorkshopStats {
            total_registrations,
            ..Default::default()
        };
        for (style, count) in rows {
            stats.total_workshops += count;
            stats.workshops_by_style.insert(style, count);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Paris"), "Paris");
    }
}
