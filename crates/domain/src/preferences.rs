use std::sync::Arc;

use taskdeps_config::NotificationConfig;
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::{debug, info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::entities::{NotificationPreference, PreferenceUpdate};
use crate::repositories::PreferenceRepository;
use crate::value_objects::{ProjectId, UserId};

/// Resolves and edits notification preferences.
///
/// Lookup order is the project row, then the user's global row, then the
/// configured defaults. A missing row is never an error.
pub struct PreferenceService {
    repository: Arc<dyn PreferenceRepository>,
    defaults: NotificationConfig,
    clock: Arc<dyn Clock>,
}

impl PreferenceService {
    pub fn new(repository: Arc<dyn PreferenceRepository>, defaults: NotificationConfig) -> Self {
        Self {
            repository,
            defaults,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The preference that governs `user_id` for an event in `project_id`.
    pub async fn effective(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> DependencyResult<NotificationPreference> {
        if project_id.is_some() {
            if let Some(found) = self.repository.find(user_id, project_id).await? {
                return Ok(found);
            }
        }
        if let Some(global) = self.repository.find(user_id, None).await? {
            return Ok(global);
        }
        debug!(user_id, ?project_id, "no stored preference, using defaults");
        Ok(NotificationPreference::defaults(user_id, project_id, &self.defaults))
    }

    pub async fn get(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> DependencyResult<NotificationPreference> {
        self.effective(user_id, project_id).await
    }

    /// Merges `update` into the row for exactly this scope, creating it
    /// from the resolved preference when absent.
    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
        update: &PreferenceUpdate,
    ) -> DependencyResult<NotificationPreference> {
        update.validate()?;
        // project key 0 is the stored form of the global row
        if project_id.is_some_and(|id| id <= 0) {
            return Err(DependencyError::validation_error(
                "project id must be positive",
            ));
        }
        let mut preference = match self.repository.find(user_id, project_id).await? {
            Some(existing) => existing,
            None => {
                let mut seeded = self.effective(user_id, project_id).await?;
                seeded.id = 0;
                seeded.project_id = project_id;
                seeded
            }
        };
        preference.apply(update, self.clock.now());
        let saved = self.repository.upsert(&preference).await?;
        info!(user_id, ?project_id, enabled = saved.enabled, "notification preferences updated");
        Ok(saved)
    }
}
