use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use taskdeps_domain::{NotificationPreference, PreferenceRepository, ProjectId, UserId};
use taskdeps_errors::DependencyResult;
use tracing::{debug, instrument};

use crate::{
    database::mapping::MappingHelpers,
    error_handling::{EntityKind, RepositoryErrorHelpers, RepositoryOperation},
    op_context,
};

const PREFERENCE_COLUMNS: &str = "id, user_id, project_key, enabled, channels, events, frequency, thresholds, quiet_hours, created_at, updated_at";

/// Global rows are keyed with project 0 so the unique index covers them.
const GLOBAL_PROJECT_KEY: i64 = 0;

fn project_key(project_id: Option<ProjectId>) -> i64 {
    project_id.unwrap_or(GLOBAL_PROJECT_KEY)
}

pub struct SqlitePreferenceRepository {
    pool: SqlitePool,
}

impl SqlitePreferenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_preference(row: &sqlx::sqlite::SqliteRow) -> DependencyResult<NotificationPreference> {
        let key: i64 = row.try_get("project_key")?;
        Ok(NotificationPreference {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            project_id: (key != GLOBAL_PROJECT_KEY).then_some(key),
            enabled: row.try_get("enabled")?,
            channels: MappingHelpers::parse_json_sqlite(row, "channels")?,
            events: MappingHelpers::parse_json_sqlite(row, "events")?,
            frequency: row.try_get("frequency")?,
            thresholds: MappingHelpers::parse_json_sqlite(row, "thresholds")?,
            quiet_hours: MappingHelpers::parse_optional_json_sqlite(row, "quiet_hours")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PreferenceRepository for SqlitePreferenceRepository {
    #[instrument(skip(self))]
    async fn find(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> DependencyResult<Option<NotificationPreference>> {
        let row = sqlx::query(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = ?1 AND project_key = ?2"
        ))
        .bind(user_id)
        .bind(project_key(project_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Read, EntityKind::Preference)
                    .with_additional_info(format!("用户 {user_id}, 项目 {project_id:?}")),
                e,
            )
        })?;

        row.as_ref().map(Self::row_to_preference).transpose()
    }

    #[instrument(skip(self, preference), fields(
        user_id = preference.user_id,
        project_id = ?preference.project_id,
    ))]
    async fn upsert(&self, preference: &NotificationPreference) -> DependencyResult<NotificationPreference> {
        let context = op_context!(RepositoryOperation::Update, EntityKind::Preference)
            .with_additional_info(format!(
                "用户 {}, 项目 {:?}",
                preference.user_id, preference.project_id
            ));

        let quiet_hours = preference
            .quiet_hours
            .as_ref()
            .map(MappingHelpers::to_json)
            .transpose()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO notification_preferences (
                user_id, project_key, enabled, channels, events, frequency, thresholds,
                quiet_hours, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (user_id, project_key) DO UPDATE SET
                enabled = excluded.enabled,
                channels = excluded.channels,
                events = excluded.events,
                frequency = excluded.frequency,
                thresholds = excluded.thresholds,
                quiet_hours = excluded.quiet_hours,
                updated_at = excluded.updated_at
            RETURNING {PREFERENCE_COLUMNS}
            "#
        ))
        .bind(preference.user_id)
        .bind(project_key(preference.project_id))
        .bind(preference.enabled)
        .bind(MappingHelpers::to_json(&preference.channels)?)
        .bind(MappingHelpers::to_json(&preference.events)?)
        .bind(preference.frequency)
        .bind(MappingHelpers::to_json(&preference.thresholds)?)
        .bind(quiet_hours)
        .bind(preference.created_at)
        .bind(preference.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        let saved = Self::row_to_preference(&row)?;
        debug!("saved preference {}", saved.id);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use taskdeps_domain::Frequency;
    use taskdeps_testing_utils::PreferenceBuilder;

    #[tokio::test]
    async fn test_global_and_project_rows_are_distinct() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqlitePreferenceRepository::new(db.pool().clone());

        let global = repo.upsert(&PreferenceBuilder::new(1).build()).await.unwrap();
        let project = repo
            .upsert(&PreferenceBuilder::new(1).for_project(5).disabled().build())
            .await
            .unwrap();
        assert_ne!(global.id, project.id);

        let found_global = repo.find(1, None).await.unwrap().unwrap();
        assert!(found_global.enabled);
        assert_eq!(found_global.project_id, None);

        let found_project = repo.find(1, Some(5)).await.unwrap().unwrap();
        assert!(!found_project.enabled);
        assert_eq!(found_project.project_id, Some(5));

        assert!(repo.find(1, Some(6)).await.unwrap().is_none());
        assert!(repo.find(2, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqlitePreferenceRepository::new(db.pool().clone());

        let first = repo
            .upsert(&PreferenceBuilder::new(3).with_quiet_hours(22, 7).build())
            .await
            .unwrap();
        assert_eq!(first.quiet_hours.map(|q| (q.start_hour, q.end_hour)), Some((22, 7)));

        let mut changed = first.clone();
        changed.frequency = Frequency::Weekly;
        changed.quiet_hours = None;
        changed.channels.push = true;
        let second = repo.upsert(&changed).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.frequency, Frequency::Weekly);
        assert!(second.quiet_hours.is_none());
        assert!(second.channels.push);
    }
}
