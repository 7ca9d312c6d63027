use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use taskdeps_domain::{ProjectId, Task, TaskId, TaskRepository};
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::{debug, instrument};

use crate::{
    database::mapping::MappingHelpers,
    error_handling::{EntityKind, RepositoryErrorHelpers, RepositoryOperation},
    op_context,
};

const TASK_COLUMNS: &str = "id, title, status, start_date, due_date, project_id, created_by, assignees, watchers, created_at, updated_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> DependencyResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            status: row.try_get("status")?,
            start_date: row.try_get("start_date")?,
            due_date: row.try_get("due_date")?,
            project_id: row.try_get("project_id")?,
            created_by: row.try_get("created_by")?,
            assignees: MappingHelpers::parse_json_sqlite(row, "assignees")?,
            watchers: MappingHelpers::parse_json_sqlite(row, "watchers")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_title = %task.title))]
    async fn create(&self, task: &Task) -> DependencyResult<Task> {
        let context = op_context!(RepositoryOperation::Create, EntityKind::Task)
            .with_additional_info(task.title.clone());

        let assignees = MappingHelpers::to_json(&task.assignees)?;
        let watchers = MappingHelpers::to_json(&task.watchers)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (title, status, start_date, due_date, project_id, created_by, assignees, watchers, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.title)
        .bind(task.status)
        .bind(task.start_date)
        .bind(task.due_date)
        .bind(task.project_id)
        .bind(task.created_by)
        .bind(assignees)
        .bind(watchers)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        let created = Self::row_to_task(&row)?;
        debug!("created task {} '{}'", created.id, created.title);
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: TaskId) -> DependencyResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    op_context!(RepositoryOperation::Read, EntityKind::Task, id = id),
                    e,
                )
            })?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_by_ids(&self, ids: &[TaskId]) -> DependencyResult<Vec<Task>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let context = op_context!(RepositoryOperation::BatchRead, EntityKind::Task)
            .with_additional_info(format!("批量查询{}个任务", ids.len()));

        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id IN ({}) ORDER BY id",
            MappingHelpers::placeholders(1, ids.len())
        );
        let mut query = sqlx::query(&sql);
        for &id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self))]
    async fn find_by_project(&self, project_id: ProjectId) -> DependencyResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY id"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Query, EntityKind::Task)
                    .with_additional_info(format!("项目 {project_id}")),
                e,
            )
        })?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, task), fields(task_id = task.id))]
    async fn update(&self, task: &Task) -> DependencyResult<Task> {
        let context = op_context!(RepositoryOperation::Update, EntityKind::Task, id = task.id);

        let assignees = MappingHelpers::to_json(&task.assignees)?;
        let watchers = MappingHelpers::to_json(&task.watchers)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET title = ?2, status = ?3, start_date = ?4, due_date = ?5, project_id = ?6,
                assignees = ?7, watchers = ?8, updated_at = ?9
            WHERE id = ?1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(&task.title)
        .bind(task.status)
        .bind(task.start_date)
        .bind(task.due_date)
        .bind(task.project_id)
        .bind(assignees)
        .bind(watchers)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;

        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(DependencyError::task_not_found(task.id)),
        }
    }

    /// Dependencies go with the task through `ON DELETE CASCADE`.
    #[instrument(skip(self))]
    async fn delete(&self, id: TaskId) -> DependencyResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    op_context!(RepositoryOperation::Delete, EntityKind::Task, id = id),
                    e,
                )
            })?;

        Ok(result.rows_affected() > 0)
    }
}
