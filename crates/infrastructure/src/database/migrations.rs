//! Idempotent schema setup for the SQLite store.

use sqlx::SqlitePool;
use taskdeps_errors::DependencyResult;
use tracing::debug;

use crate::error_handling::{EntityKind, RepositoryErrorHelpers, RepositoryOperation};
use crate::op_context;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'todo',
        start_date TEXT,
        due_date TEXT,
        project_id INTEGER,
        created_by INTEGER,
        assignees TEXT NOT NULL DEFAULT '[]',
        watchers TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_dependencies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        predecessor_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        successor_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        dependency_type TEXT NOT NULL DEFAULT 'FS',
        lag_time INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        metadata TEXT NOT NULL DEFAULT '{}',
        violation_state TEXT NOT NULL DEFAULT 'none',
        created_by INTEGER,
        updated_by INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (predecessor_task_id <> successor_task_id),
        UNIQUE (predecessor_task_id, successor_task_id, dependency_type)
    )
    "#,
    // no foreign key: a removal notice outlives its dependency
    r#"
    CREATE TABLE IF NOT EXISTS dependency_notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dependency_id INTEGER NOT NULL,
        notification_type TEXT NOT NULL,
        priority TEXT NOT NULL DEFAULT 'normal',
        status TEXT NOT NULL DEFAULT 'pending',
        scheduled_at TEXT,
        sent_at TEXT,
        content TEXT NOT NULL DEFAULT '{}',
        recipients TEXT NOT NULL DEFAULT '[]',
        channels TEXT NOT NULL DEFAULT '[]',
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    // project_key 0 is the user's global row
    r#"
    CREATE TABLE IF NOT EXISTS notification_preferences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        project_key INTEGER NOT NULL DEFAULT 0,
        enabled INTEGER NOT NULL DEFAULT 1,
        channels TEXT NOT NULL,
        events TEXT NOT NULL,
        frequency TEXT NOT NULL DEFAULT 'immediate',
        thresholds TEXT NOT NULL,
        quiet_hours TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, project_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notification_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        notification_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        channel TEXT NOT NULL,
        status TEXT NOT NULL,
        delivered_at TEXT,
        opened_at TEXT,
        clicked_at TEXT,
        failure_reason TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_dependencies_predecessor ON task_dependencies(predecessor_task_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_dependencies_successor ON task_dependencies(successor_task_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_dependencies_active ON task_dependencies(is_active)",
    "CREATE INDEX IF NOT EXISTS idx_dependency_notifications_dependency ON dependency_notifications(dependency_id)",
    "CREATE INDEX IF NOT EXISTS idx_dependency_notifications_due ON dependency_notifications(status, scheduled_at)",
    "CREATE INDEX IF NOT EXISTS idx_notification_logs_notification ON notification_logs(notification_id)",
    "CREATE INDEX IF NOT EXISTS idx_notification_logs_user ON notification_logs(user_id, created_at)",
];

pub async fn run_migrations(pool: &SqlitePool) -> DependencyResult<()> {
    debug!("Running SQLite database migrations");

    for statement in SCHEMA.iter().chain(INDEXES) {
        sqlx::query(statement).execute(pool).await.map_err(|e| {
            RepositoryErrorHelpers::database_error(
                op_context!(RepositoryOperation::Migrate, EntityKind::Schema),
                e,
            )
        })?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
