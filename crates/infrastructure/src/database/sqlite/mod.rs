pub mod sqlite_dependency_repository;
pub mod sqlite_notification_log_repository;
pub mod sqlite_notification_repository;
pub mod sqlite_preference_repository;
pub mod sqlite_task_repository;

pub use sqlite_dependency_repository::SqliteDependencyRepository;
pub use sqlite_notification_log_repository::SqliteNotificationLogRepository;
pub use sqlite_notification_repository::SqliteNotificationRepository;
pub use sqlite_preference_repository::SqlitePreferenceRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
