use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};
use taskdeps_domain::{
    DependencyGraph, DependencyRepository, Direction, TaskDependency, TaskId, ViolationState,
};
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::{debug, instrument, warn};

use crate::{
    database::mapping::MappingHelpers,
    error_handling::{EntityKind, OperationContext, RepositoryErrorHelpers, RepositoryOperation},
    op_context,
};

const DEPENDENCY_COLUMNS: &str = "id, predecessor_task_id, successor_task_id, dependency_type, lag_time, is_active, metadata, violation_state, created_by, updated_by, created_at, updated_at";

/// SQLite store for dependency edges.
///
/// Writes run inside `BEGIN IMMEDIATE`, so the duplicate and cycle checks
/// see the same active edge set the write lands in.
pub struct SqliteDependencyRepository {
    pool: SqlitePool,
}

impl SqliteDependencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_dependency(row: &sqlx::sqlite::SqliteRow) -> DependencyResult<TaskDependency> {
        Ok(TaskDependency {
            id: row.try_get("id")?,
            predecessor_task_id: row.try_get("predecessor_task_id")?,
            successor_task_id: row.try_get("successor_task_id")?,
            dependency_type: row.try_get("dependency_type")?,
            lag_time: row.try_get("lag_time")?,
            is_active: row.try_get("is_active")?,
            metadata: MappingHelpers::parse_json_sqlite(row, "metadata")?,
            violation_state: row.try_get("violation_state")?,
            created_by: row.try_get("created_by")?,
            updated_by: row.try_get("updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Duplicate triple and cycle checks against committed rows, ignoring
    /// the record being rewritten.
    async fn check_constraints(
        conn: &mut SqliteConnection,
        dependency: &TaskDependency,
        context: &OperationContext,
    ) -> DependencyResult<()> {
        let duplicate: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM task_dependencies
            WHERE predecessor_task_id = ?1 AND successor_task_id = ?2 AND dependency_type = ?3 AND id <> ?4
            "#,
        )
        .bind(dependency.predecessor_task_id)
        .bind(dependency.successor_task_id)
        .bind(dependency.dependency_type)
        .bind(dependency.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;

        if duplicate.is_some() {
            return Err(DependencyError::duplicate(
                dependency.predecessor_task_id,
                dependency.successor_task_id,
                dependency.dependency_type.as_str(),
            ));
        }

        if !dependency.is_active {
            return Ok(());
        }

        let rows = sqlx::query(&format!(
            "SELECT {DEPENDENCY_COLUMNS} FROM task_dependencies WHERE is_active = 1 AND id <> ?1"
        ))
        .bind(dependency.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        let active = rows
            .iter()
            .map(Self::row_to_dependency)
            .collect::<DependencyResult<Vec<_>>>()?;

        DependencyGraph::from_dependencies(&active)
            .ensure_acyclic_insert(dependency.predecessor_task_id, dependency.successor_task_id)
    }

    async fn insert_checked(conn: &mut SqliteConnection, dependency: &TaskDependency) -> DependencyResult<TaskDependency> {
        let context = op_context!(RepositoryOperation::Create, EntityKind::Dependency).with_additional_info(
            format!(
                "{} -> {} ({})",
                dependency.predecessor_task_id, dependency.successor_task_id, dependency.dependency_type
            ),
        );

        let mut candidate = dependency.clone();
        candidate.id = 0;
        Self::check_constraints(conn, &candidate, &context).await?;

        let metadata = MappingHelpers::to_json(&dependency.metadata)?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO task_dependencies (
                predecessor_task_id, successor_task_id, dependency_type, lag_time, is_active,
                metadata, violation_state, created_by, updated_by, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING {DEPENDENCY_COLUMNS}
            "#
        ))
        .bind(dependency.predecessor_task_id)
        .bind(dependency.successor_task_id)
        .bind(dependency.dependency_type)
        .bind(dependency.lag_time)
        .bind(dependency.is_active)
        .bind(metadata)
        .bind(dependency.violation_state)
        .bind(dependency.created_by)
        .bind(dependency.updated_by)
        .bind(dependency.created_at)
        .bind(dependency.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryErrorHelpers::dependency_database_error(context, dependency, e))?;

        Self::row_to_dependency(&row)
    }

    async fn update_checked(conn: &mut SqliteConnection, dependency: &TaskDependency) -> DependencyResult<TaskDependency> {
        let context = op_context!(RepositoryOperation::Update, EntityKind::Dependency, id = dependency.id);

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM task_dependencies WHERE id = ?1")
            .bind(dependency.id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context.clone(), e))?;
        if exists.is_none() {
            return Err(DependencyError::dependency_not_found(dependency.id));
        }

        Self::check_constraints(conn, dependency, &context).await?;

        let metadata = MappingHelpers::to_json(&dependency.metadata)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE task_dependencies
            SET dependency_type = ?2, lag_time = ?3, is_active = ?4, metadata = ?5,
                violation_state = ?6, updated_by = ?7, updated_at = ?8
            WHERE id = ?1
            RETURNING {DEPENDENCY_COLUMNS}
            "#
        ))
        .bind(dependency.id)
        .bind(dependency.dependency_type)
        .bind(dependency.lag_time)
        .bind(dependency.is_active)
        .bind(metadata)
        .bind(dependency.violation_state)
        .bind(dependency.updated_by)
        .bind(dependency.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryErrorHelpers::dependency_database_error(context, dependency, e))?;

        Self::row_to_dependency(&row)
    }

    async fn begin_immediate(&self) -> DependencyResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }

    async fn finish(
        conn: &mut SqliteConnection,
        result: DependencyResult<TaskDependency>,
    ) -> DependencyResult<TaskDependency> {
        let error = match result {
            Ok(dependency) => match sqlx::query("COMMIT").execute(&mut *conn).await {
                Ok(_) => return Ok(dependency),
                Err(e) => DependencyError::from(e),
            },
            Err(e) => e,
        };
        if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            warn!(error = %rollback, "rollback after failed dependency write also failed");
        }
        Err(error)
    }

    async fn fetch_where(
        &self,
        clause: &str,
        binds: &[i64],
        context: OperationContext,
    ) -> DependencyResult<Vec<TaskDependency>> {
        let sql = format!("SELECT {DEPENDENCY_COLUMNS} FROM task_dependencies WHERE {clause} ORDER BY id");
        let mut query = sqlx::query(&sql);
        for &value in binds {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(context, e))?;
        rows.iter().map(Self::row_to_dependency).collect()
    }
}

#[async_trait]
impl DependencyRepository for SqliteDependencyRepository {
    #[instrument(skip(self, dependency), fields(
        predecessor = dependency.predecessor_task_id,
        successor = dependency.successor_task_id,
        dependency_type = %dependency.dependency_type,
    ))]
    async fn create(&self, dependency: &TaskDependency) -> DependencyResult<TaskDependency> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::insert_checked(&mut conn, dependency).await;
        let created = Self::finish(&mut conn, result).await?;
        debug!("created dependency {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> DependencyResult<Option<TaskDependency>> {
        let row = sqlx::query(&format!(
            "SELECT {DEPENDENCY_COLUMNS} FROM task_dependencies WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Read, EntityKind::Dependency, id = id),
                e,
            )
        })?;

        row.as_ref().map(Self::row_to_dependency).transpose()
    }

    #[instrument(skip(self, dependency), fields(dependency_id = dependency.id))]
    async fn update(&self, dependency: &TaskDependency) -> DependencyResult<TaskDependency> {
        let mut conn = self.begin_immediate().await?;
        let result = Self::update_checked(&mut conn, dependency).await;
        Self::finish(&mut conn, result).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> DependencyResult<bool> {
        let result = sqlx::query("DELETE FROM task_dependencies WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    op_context!(RepositoryOperation::Delete, EntityKind::Dependency, id = id),
                    e,
                )
            })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_for_task(
        &self,
        task_id: TaskId,
        direction: Direction,
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>> {
        let endpoint = match direction {
            Direction::Predecessors => "successor_task_id = ?1",
            Direction::Successors => "predecessor_task_id = ?1",
            Direction::Both => "(predecessor_task_id = ?1 OR successor_task_id = ?1)",
        };
        let clause = if include_inactive {
            endpoint.to_string()
        } else {
            format!("{endpoint} AND is_active = 1")
        };

        self.fetch_where(
            &clause,
            &[task_id],
            op_context!(RepositoryOperation::Query, EntityKind::Dependency)
                .with_additional_info(format!("任务 {task_id}")),
        )
        .await
    }

    #[instrument(skip(self, task_ids), fields(count = task_ids.len()))]
    async fn find_for_tasks(
        &self,
        task_ids: &[TaskId],
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>> {
        if task_ids.is_empty() {
            return Ok(vec![]);
        }

        let placeholders = MappingHelpers::placeholders(1, task_ids.len());
        let mut clause = format!(
            "(predecessor_task_id IN ({placeholders}) OR successor_task_id IN ({placeholders}))"
        );
        if !include_inactive {
            clause.push_str(" AND is_active = 1");
        }

        self.fetch_where(
            &clause,
            task_ids,
            op_context!(RepositoryOperation::BatchRead, EntityKind::Dependency)
                .with_additional_info(format!("{}个任务", task_ids.len())),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn find_active(&self) -> DependencyResult<Vec<TaskDependency>> {
        self.fetch_where(
            "is_active = 1",
            &[],
            op_context!(RepositoryOperation::Query, EntityKind::Dependency),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn set_violation_state(&self, id: i64, state: ViolationState) -> DependencyResult<()> {
        let result = sqlx::query("UPDATE task_dependencies SET violation_state = ?2 WHERE id = ?1")
            .bind(id)
            .bind(state)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    op_context!(RepositoryOperation::Update, EntityKind::Dependency, id = id),
                    e,
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(DependencyError::dependency_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DatabaseManager, SqliteTaskRepository};
    use taskdeps_domain::{DependencyType, TaskRepository};
    use taskdeps_testing_utils::{DependencyBuilder, TaskBuilder};

    async fn setup(task_count: usize) -> (DatabaseManager, SqliteDependencyRepository, Vec<TaskId>) {
        let db = DatabaseManager::in_memory().await.unwrap();
        let tasks = SqliteTaskRepository::new(db.pool().clone());
        let mut ids = Vec::new();
        for i in 0..task_count {
            let task = tasks
                .create(&TaskBuilder::new().with_title(&format!("task-{i}")).build())
                .await
                .unwrap();
            ids.push(task.id);
        }
        let repo = SqliteDependencyRepository::new(db.pool().clone());
        (db, repo, ids)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (_db, repo, t) = setup(3).await;

        let created = repo
            .create(&DependencyBuilder::new(t[0], t[1]).with_lag(48).build())
            .await
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.lag_time, 48);

        let found = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.dependency_type, DependencyType::FinishToStart);
        assert_eq!(found.violation_state, ViolationState::None);

        assert_eq!(repo.find_for_task(t[1], Direction::Predecessors, false).await.unwrap().len(), 1);
        assert!(repo.find_for_task(t[1], Direction::Successors, false).await.unwrap().is_empty());
        assert_eq!(repo.find_for_task(t[0], Direction::Both, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_triple_rejected_but_other_type_allowed() {
        let (_db, repo, t) = setup(2).await;

        repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap();
        let err = repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap_err();
        assert!(matches!(err, DependencyError::DuplicateDependency { .. }));

        repo.create(
            &DependencyBuilder::new(t[0], t[1])
                .with_type(DependencyType::StartToStart)
                .build(),
        )
        .await
        .unwrap();
        assert_eq!(repo.find_active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cycle_rejected() {
        let (_db, repo, t) = setup(3).await;

        repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap();
        repo.create(&DependencyBuilder::new(t[1], t[2]).build()).await.unwrap();
        let err = repo.create(&DependencyBuilder::new(t[2], t[0]).build()).await.unwrap_err();
        assert!(matches!(err, DependencyError::CyclicDependency { .. }));

        // an inactive back edge is not part of the graph
        repo.create(&DependencyBuilder::new(t[2], t[0]).inactive().build())
            .await
            .unwrap();
        assert_eq!(repo.find_active().await.unwrap().len(), 2);
        assert_eq!(
            repo.find_for_task(t[0], Direction::Both, true).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_reactivating_back_edge_is_checked() {
        let (_db, repo, t) = setup(2).await;

        repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap();
        let mut back = repo
            .create(&DependencyBuilder::new(t[1], t[0]).inactive().build())
            .await
            .unwrap();

        back.is_active = true;
        let err = repo.update(&back).await.unwrap_err();
        assert!(matches!(err, DependencyError::CyclicDependency { .. }));

        // the failed write was rolled back and the connection is usable
        let stored = repo.find_by_id(back.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_update_type_into_existing_triple() {
        let (_db, repo, t) = setup(2).await;

        repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap();
        let mut ss = repo
            .create(
                &DependencyBuilder::new(t[0], t[1])
                    .with_type(DependencyType::StartToStart)
                    .build(),
            )
            .await
            .unwrap();

        ss.dependency_type = DependencyType::FinishToStart;
        assert!(matches!(
            repo.update(&ss).await,
            Err(DependencyError::DuplicateDependency { .. })
        ));

        ss.dependency_type = DependencyType::FinishToFinish;
        ss.lag_time = 12;
        let updated = repo.update(&ss).await.unwrap();
        assert_eq!(updated.dependency_type, DependencyType::FinishToFinish);
        assert_eq!(updated.lag_time, 12);
    }

    #[tokio::test]
    async fn test_task_delete_cascades() {
        let (db, repo, t) = setup(3).await;
        let tasks = SqliteTaskRepository::new(db.pool().clone());

        repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap();
        repo.create(&DependencyBuilder::new(t[1], t[2]).build()).await.unwrap();

        assert!(tasks.delete(t[1]).await.unwrap());
        assert!(repo.find_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_violation_state_and_find_for_tasks() {
        let (_db, repo, t) = setup(3).await;

        let dep = repo.create(&DependencyBuilder::new(t[0], t[1]).build()).await.unwrap();
        repo.create(&DependencyBuilder::new(t[1], t[2]).build()).await.unwrap();

        repo.set_violation_state(dep.id, ViolationState::Violation).await.unwrap();
        let stored = repo.find_by_id(dep.id).await.unwrap().unwrap();
        assert_eq!(stored.violation_state, ViolationState::Violation);

        assert!(matches!(
            repo.set_violation_state(999, ViolationState::Warning).await,
            Err(DependencyError::DependencyNotFound { id: 999 })
        ));

        assert_eq!(repo.find_for_tasks(&[t[0]], false).await.unwrap().len(), 1);
        assert_eq!(repo.find_for_tasks(&[t[0], t[2]], false).await.unwrap().len(), 2);
        assert!(repo.delete(dep.id).await.unwrap());
        assert!(!repo.delete(dep.id).await.unwrap());
    }
}
