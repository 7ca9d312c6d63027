use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use taskdeps_domain::{LogQuery, NotificationLog, NotificationLogRepository, Page, UserId};
use taskdeps_errors::DependencyResult;
use tracing::instrument;

use crate::{
    database::mapping::MappingHelpers,
    error_handling::{EntityKind, RepositoryErrorHelpers, RepositoryOperation},
    op_context,
};

const LOG_COLUMNS: &str = "id, notification_id, user_id, channel, status, delivered_at, opened_at, clicked_at, failure_reason, metadata, created_at";

/// Shared by the count and page queries; unset filters bind NULL.
const USER_FILTER: &str = r#"
    user_id = ?1
    AND (?2 IS NULL OR channel = ?2)
    AND (?3 IS NULL OR status = ?3)
    AND (?4 IS NULL OR julianday(created_at) >= julianday(?4))
    AND (?5 IS NULL OR julianday(created_at) <= julianday(?5))
"#;

/// Append-only: rows are inserted and read, never updated.
pub struct SqliteNotificationLogRepository {
    pool: SqlitePool,
}

impl SqliteNotificationLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> DependencyResult<NotificationLog> {
        Ok(NotificationLog {
            id: row.try_get("id")?,
            notification_id: row.try_get("notification_id")?,
            user_id: row.try_get("user_id")?,
            channel: row.try_get("channel")?,
            status: row.try_get("status")?,
            delivered_at: row.try_get("delivered_at")?,
            opened_at: row.try_get("opened_at")?,
            clicked_at: row.try_get("clicked_at")?,
            failure_reason: row.try_get("failure_reason")?,
            metadata: MappingHelpers::parse_json_sqlite(row, "metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl NotificationLogRepository for SqliteNotificationLogRepository {
    #[instrument(skip(self, log), fields(
        notification_id = log.notification_id,
        user_id = log.user_id,
        channel = %log.channel,
    ))]
    async fn append(&self, log: &NotificationLog) -> DependencyResult<NotificationLog> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO notification_logs (
                notification_id, user_id, channel, status, delivered_at, opened_at, clicked_at,
                failure_reason, metadata, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(log.notification_id)
        .bind(log.user_id)
        .bind(log.channel)
        .bind(log.status)
        .bind(log.delivered_at)
        .bind(log.opened_at)
        .bind(log.clicked_at)
        .bind(&log.failure_reason)
        .bind(MappingHelpers::to_json(&log.metadata)?)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Create, EntityKind::NotificationLog)
                    .with_additional_info(format!("通知 {}", log.notification_id)),
                e,
            )
        })?;

        Self::row_to_log(&row)
    }

    #[instrument(skip(self))]
    async fn find_by_notification(&self, notification_id: i64) -> DependencyResult<Vec<NotificationLog>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM notification_logs WHERE notification_id = ?1 ORDER BY id"
        ))
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Query, EntityKind::NotificationLog)
                    .with_additional_info(format!("通知 {notification_id}")),
                e,
            )
        })?;

        rows.iter().map(Self::row_to_log).collect()
    }

    #[instrument(skip(self, query))]
    async fn find_by_user(&self, user_id: UserId, query: &LogQuery) -> DependencyResult<Page<NotificationLog>> {
        let context = op_context!(RepositoryOperation::Query, EntityKind::NotificationLog)
            .with_additional_info(format!("用户 {user_id}"));

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notification_logs WHERE {USER_FILTER}"
        ))
        .bind(user_id)
        .bind(query.channel)
        .bind(query.status)
        .bind(query.since)
        .bind(query.until)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM notification_logs
            WHERE {USER_FILTER}
            ORDER BY julianday(created_at) DESC, id DESC
            LIMIT ?6 OFFSET ?7
            "#
        ))
        .bind(user_id)
        .bind(query.channel)
        .bind(query.status)
        .bind(query.since)
        .bind(query.until)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        Ok(Page {
            items: rows.iter().map(Self::row_to_log).collect::<DependencyResult<Vec<_>>>()?,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use chrono::Duration;
    use taskdeps_domain::{Channel, DeliveryStatus};
    use taskdeps_testing_utils::day;

    #[tokio::test]
    async fn test_append_and_find_by_notification() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteNotificationLogRepository::new(db.pool().clone());

        let delivered = repo
            .append(&NotificationLog::record(10, 1, Channel::Email, DeliveryStatus::Delivered, day(0)))
            .await
            .unwrap();
        assert!(delivered.id > 0);
        assert_eq!(delivered.delivered_at, Some(day(0)));

        repo.append(&NotificationLog::failed(10, 2, Channel::Push, "no device", day(0)))
            .await
            .unwrap();
        repo.append(&NotificationLog::record(11, 1, Channel::InApp, DeliveryStatus::Delivered, day(1)))
            .await
            .unwrap();

        let logs = repo.find_by_notification(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].failure_reason.as_deref(), Some("no device"));
        assert_eq!(logs[1].status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_find_by_user_filters_and_pages() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteNotificationLogRepository::new(db.pool().clone());

        for n in 0..4 {
            repo.append(&NotificationLog::record(n, 1, Channel::Email, DeliveryStatus::Delivered, day(n)))
                .await
                .unwrap();
        }
        repo.append(&NotificationLog::record(9, 1, Channel::InApp, DeliveryStatus::Opened, day(2)))
            .await
            .unwrap();
        repo.append(&NotificationLog::record(9, 2, Channel::Email, DeliveryStatus::Delivered, day(2)))
            .await
            .unwrap();

        let all = repo.find_by_user(1, &LogQuery::default()).await.unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.items[0].created_at, day(3));

        let email_only = LogQuery {
            channel: Some(Channel::Email),
            limit: 2,
            ..LogQuery::default()
        };
        let page = repo.find_by_user(1, &email_only).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 2);

        let window = LogQuery {
            since: Some(day(1)),
            until: Some(day(2) + Duration::hours(1)),
            status: Some(DeliveryStatus::Delivered),
            ..LogQuery::default()
        };
        let windowed = repo.find_by_user(1, &window).await.unwrap();
        assert_eq!(windowed.total, 2);
    }
}
