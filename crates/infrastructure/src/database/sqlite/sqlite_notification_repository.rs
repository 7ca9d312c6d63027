use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use taskdeps_domain::{
    DependencyNotification, NotificationContent, NotificationRepository, NotificationStatus, Page,
};
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::{debug, instrument};

use crate::{
    database::mapping::MappingHelpers,
    error_handling::{EntityKind, RepositoryErrorHelpers, RepositoryOperation},
    op_context,
};

const NOTIFICATION_COLUMNS: &str = "id, dependency_id, notification_type, priority, status, scheduled_at, sent_at, content, recipients, channels, metadata, created_at, updated_at";

const PRIORITY_RANK: &str =
    "CASE priority WHEN 'critical' THEN 3 WHEN 'high' THEN 2 WHEN 'normal' THEN 1 ELSE 0 END";

pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> DependencyResult<DependencyNotification> {
        let content: NotificationContent = MappingHelpers::parse_json_sqlite(row, "content")?;
        Ok(DependencyNotification {
            id: row.try_get("id")?,
            dependency_id: row.try_get("dependency_id")?,
            notification_type: row.try_get("notification_type")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            scheduled_at: row.try_get("scheduled_at")?,
            sent_at: row.try_get("sent_at")?,
            content,
            recipients: MappingHelpers::parse_json_sqlite(row, "recipients")?,
            channels: MappingHelpers::parse_json_sqlite(row, "channels")?,
            metadata: MappingHelpers::parse_json_sqlite(row, "metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    #[instrument(skip(self, notification), fields(
        dependency_id = notification.dependency_id,
        notification_type = %notification.notification_type,
    ))]
    async fn create(&self, notification: &DependencyNotification) -> DependencyResult<DependencyNotification> {
        let context = op_context!(RepositoryOperation::Create, EntityKind::Notification)
            .with_additional_info(format!("依赖 {}", notification.dependency_id));

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO dependency_notifications (
                dependency_id, notification_type, priority, status, scheduled_at, sent_at,
                content, recipients, channels, metadata, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification.dependency_id)
        .bind(notification.notification_type)
        .bind(notification.priority)
        .bind(notification.status)
        .bind(notification.scheduled_at)
        .bind(notification.sent_at)
        .bind(MappingHelpers::to_json(&notification.content)?)
        .bind(MappingHelpers::to_json(&notification.recipients)?)
        .bind(MappingHelpers::to_json(&notification.channels)?)
        .bind(MappingHelpers::to_json(&notification.metadata)?)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        let created = Self::row_to_notification(&row)?;
        debug!("stored notification {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> DependencyResult<Option<DependencyNotification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM dependency_notifications WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Read, EntityKind::Notification, id = id),
                e,
            )
        })?;

        row.as_ref().map(Self::row_to_notification).transpose()
    }

    #[instrument(skip(self, notification), fields(notification_id = notification.id, status = %notification.status))]
    async fn update(&self, notification: &DependencyNotification) -> DependencyResult<DependencyNotification> {
        let context = op_context!(RepositoryOperation::Update, EntityKind::Notification, id = notification.id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE dependency_notifications
            SET priority = ?2, status = ?3, scheduled_at = ?4, sent_at = ?5, content = ?6,
                recipients = ?7, channels = ?8, metadata = ?9, updated_at = ?10
            WHERE id = ?1
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification.id)
        .bind(notification.priority)
        .bind(notification.status)
        .bind(notification.scheduled_at)
        .bind(notification.sent_at)
        .bind(MappingHelpers::to_json(&notification.content)?)
        .bind(MappingHelpers::to_json(&notification.recipients)?)
        .bind(MappingHelpers::to_json(&notification.channels)?)
        .bind(MappingHelpers::to_json(&notification.metadata)?)
        .bind(notification.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        match row {
            Some(row) => Self::row_to_notification(&row),
            None => Err(DependencyError::notification_not_found(notification.id)),
        }
    }

    #[instrument(skip(self, notification), fields(notification_id = notification.id))]
    async fn claim(&self, notification: &DependencyNotification) -> DependencyResult<Option<DependencyNotification>> {
        let context = op_context!(RepositoryOperation::Update, EntityKind::Notification, id = notification.id);

        let row = sqlx::query(&format!(
            r#"
            UPDATE dependency_notifications
            SET status = ?2, sent_at = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?5
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification.id)
        .bind(notification.status)
        .bind(notification.sent_at)
        .bind(notification.updated_at)
        .bind(NotificationStatus::Pending)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        if row.is_none() {
            debug!("notification {} was not pending, claim skipped", notification.id);
        }
        row.as_ref().map(Self::row_to_notification).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_dependency(
        &self,
        dependency_id: i64,
        limit: i64,
        offset: i64,
    ) -> DependencyResult<Page<DependencyNotification>> {
        let context = op_context!(RepositoryOperation::Query, EntityKind::Notification)
            .with_additional_info(format!("依赖 {dependency_id}"));

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM dependency_notifications WHERE dependency_id = ?1")
                .bind(dependency_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM dependency_notifications
            WHERE dependency_id = ?1
            ORDER BY julianday(created_at) DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(dependency_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        Ok(Page {
            items: rows
                .iter()
                .map(Self::row_to_notification)
                .collect::<DependencyResult<Vec<_>>>()?,
            total,
        })
    }

    #[instrument(skip(self))]
    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> DependencyResult<Vec<DependencyNotification>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM dependency_notifications
            WHERE status = 'pending'
              AND (scheduled_at IS NULL OR julianday(scheduled_at) <= julianday(?1))
            ORDER BY {PRIORITY_RANK} DESC, julianday(created_at) ASC, id ASC
            LIMIT ?2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Query, EntityKind::Notification)
                    .with_additional_info("待投递".to_string()),
                e,
            )
        })?;

        rows.iter().map(Self::row_to_notification).collect()
    }
}
