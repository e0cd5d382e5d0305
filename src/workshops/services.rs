use std::sync::Arc;

use tracing::info;

use crate::auth::guard::Admin;
use crate::error::{AppError, AppResult};
use crate::workshops::repo::WorkshopRepo;
use crate::workshops::repo_types::{
    NewWorkshop, Workshop, WorkshopFilter, WorkshopId, WorkshopPatch, WorkshopStats,
};

/// Workshop operations. The owner-scoped ones take an [`Admin`], so they can
/// only be reached through the admin gate; the owner is always the admin's
/// own id, never a value from the request.
#[derive(Clone)]
pub struct WorkshopService {
    repo: Arc<dyn WorkshopRepo>,
}

impl WorkshopService {
    pub fn new(repo: Arc<dyn WorkshopRepo>) -> Self {
        Self { repo }
    }

    pub async fn create_owned(&self, admin: &Admin, new: NewWorkshop) -> AppResult<WorkshopId> {
        let workshop = self.repo.insert(admin.user_id(), new).await?;
        info!(workshop_id = %workshop.id, admin_id = %workshop.admin_id, "workshop created");
        Ok(workshop.id)
    }

    pub async fn list_owned(&self, admin: &Admin) -> AppResult<Vec<Workshop>> {
        self.repo.list_by_owner(admin.user_id()).await
    }

    pub async fn list_public(&self, filter: &WorkshopFilter) -> AppResult<Vec<Workshop>> {
        filter.validate()?;
        self.repo.list_all(filter).await
    }

    pub async fn get_public(&self, id: WorkshopId) -> AppResult<Workshop> {
        self.repo
            .get(id)
            .await?
            .ok_or(AppError::NotFound("workshop"))
    }

    pub async fn update(
        &self,
        admin: &Admin,
        id: WorkshopId,
        patch: WorkshopPatch,
    ) -> AppResult<Workshop> {
        if patch.is_empty() {
            return Err(AppError::Validation("no fields to update".into()));
        }
        let workshop = self.repo.update_owned(admin.user_id(), id, patch).await?;
        info!(workshop_id = %id, admin_id = %admin.user_id(), "workshop updated");
        Ok(workshop)
    }

    pub async fn delete(&self, admin: &Admin, id: WorkshopId) -> AppResult<()> {
        self.repo.delete_owned(admin.user_id(), id).await?;
        info!(workshop_id = %id, admin_id = %admin.user_id(), "workshop deleted");
        Ok(())
    }

    pub async fn stats(&self, admin: &Admin) -> AppResult<WorkshopStats> {
        self.repo.stats_by_owner(admin.user_id()).await
    }
}
