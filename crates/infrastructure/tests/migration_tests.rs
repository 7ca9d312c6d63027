use sqlx::SqlitePool;
use taskdeps_config::DatabaseConfig;
use taskdeps_infrastructure::{run_migrations, DatabaseManager};

/// 测试数据库迁移功能
async fn setup_file_database(dir: &tempfile::TempDir) -> DatabaseManager {
    let path = dir.path().join("taskdeps_migration_test.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", path.display()),
        ..DatabaseConfig::default()
    };
    DatabaseManager::new(&config).await.unwrap()
}

async fn table_names(pool: &SqlitePool) -> Vec<String> {
    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap();
    tables.into_iter().map(|(name,)| name).collect()
}

#[tokio::test]
async fn test_database_migrations_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let db = setup_file_database(&dir).await;

    assert!(table_names(db.pool()).await.is_empty());
    db.migrate().await.unwrap();

    // 验证所有必要的表都存在
    let tables = table_names(db.pool()).await;
    for expected in [
        "dependency_notifications",
        "notification_logs",
        "notification_preferences",
        "task_dependencies",
        "tasks",
    ] {
        assert!(tables.contains(&expected.to_string()), "missing table {expected}");
    }
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let dir = tempfile::tempdir().unwrap();
    let db = setup_file_database(&dir).await;

    run_migrations(db.pool()).await.unwrap();
    let first = table_names(db.pool()).await;

    // 第二次运行迁移（应该是幂等的）
    run_migrations(db.pool()).await.unwrap();
    let second = table_names(db.pool()).await;

    assert_eq!(first, second);
    db.close().await;
}

#[tokio::test]
async fn test_schema_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = setup_file_database(&dir).await;
        db.migrate().await.unwrap();
        sqlx::query("INSERT INTO tasks (title, created_at, updated_at) VALUES ('kept', '2025-07-01T00:00:00Z', '2025-07-01T00:00:00Z')")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;
    }

    let reopened = setup_file_database(&dir).await;
    reopened.migrate().await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(reopened.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
    reopened.close().await;
}

#[tokio::test]
async fn test_schema_constraints() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let pool = db.pool();

    for title in ["a", "b"] {
        sqlx::query("INSERT INTO tasks (title, created_at, updated_at) VALUES (?1, '2025-07-01T00:00:00Z', '2025-07-01T00:00:00Z')")
            .bind(title)
            .execute(pool)
            .await
            .unwrap();
    }

    let insert_dependency = |predecessor: i64, successor: i64| {
        sqlx::query(
            "INSERT INTO task_dependencies (predecessor_task_id, successor_task_id, created_at, updated_at) VALUES (?1, ?2, '2025-07-01T00:00:00Z', '2025-07-01T00:00:00Z')",
        )
        .bind(predecessor)
        .bind(successor)
        .execute(pool)
    };

    insert_dependency(1, 2).await.unwrap();
    // 同一三元组只能出现一次
    assert!(insert_dependency(1, 2).await.is_err());
    // 自依赖被 CHECK 约束拒绝
    assert!(insert_dependency(1, 1).await.is_err());
    // 外键: 不存在的任务
    assert!(insert_dependency(1, 99).await.is_err());

    // 删除任务级联删除依赖
    sqlx::query("DELETE FROM tasks WHERE id = 2").execute(pool).await.unwrap();
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_dependencies")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    db.health_check().await.unwrap();
}
