//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskdeps_errors::DependencyResult;

use crate::entities::{
    DependencyNotification, NotificationLog, NotificationPreference, Task, TaskDependency,
};
use crate::value_objects::{
    Channel, DeliveryStatus, Direction, ProjectId, TaskId, UserId, ViolationState,
};

/// One page of a listing plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Filters for a user's delivery history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogQuery {
    pub limit: i64,
    pub offset: i64,
    pub channel: Option<Channel>,
    pub status: Option<DeliveryStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            channel: None,
            status: None,
            since: None,
            until: None,
        }
    }
}

impl LogQuery {
    pub fn matches(&self, log: &NotificationLog) -> bool {
        self.channel.map_or(true, |channel| channel == log.channel)
            && self.status.map_or(true, |status| status == log.status)
            && self.since.map_or(true, |since| log.created_at >= since)
            && self.until.map_or(true, |until| log.created_at <= until)
    }
}

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> DependencyResult<Task>;
    async fn find_by_id(&self, id: TaskId) -> DependencyResult<Option<Task>>;
    async fn find_by_ids(&self, ids: &[TaskId]) -> DependencyResult<Vec<Task>>;
    async fn find_by_project(&self, project_id: ProjectId) -> DependencyResult<Vec<Task>>;
    async fn update(&self, task: &Task) -> DependencyResult<Task>;
    /// Removes the task and every dependency that references it.
    async fn delete(&self, id: TaskId) -> DependencyResult<bool>;
}

/// 依赖关系仓储抽象
#[async_trait]
pub trait DependencyRepository: Send + Sync {
    /// Inserts after checking, atomically with the insert, that the
    /// (predecessor, successor, type) triple is unused and that the edge
    /// closes no cycle among active dependencies.
    async fn create(&self, dependency: &TaskDependency) -> DependencyResult<TaskDependency>;
    async fn find_by_id(&self, id: i64) -> DependencyResult<Option<TaskDependency>>;
    /// Same uniqueness and, for active records, acyclicity guarantees as `create`.
    async fn update(&self, dependency: &TaskDependency) -> DependencyResult<TaskDependency>;
    async fn delete(&self, id: i64) -> DependencyResult<bool>;
    async fn find_for_task(
        &self,
        task_id: TaskId,
        direction: Direction,
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>>;
    /// Dependencies with at least one endpoint in `task_ids`.
    async fn find_for_tasks(
        &self,
        task_ids: &[TaskId],
        include_inactive: bool,
    ) -> DependencyResult<Vec<TaskDependency>>;
    async fn find_active(&self) -> DependencyResult<Vec<TaskDependency>>;
    async fn set_violation_state(&self, id: i64, state: ViolationState) -> DependencyResult<()>;
}

/// 依赖通知仓储抽象
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &DependencyNotification) -> DependencyResult<DependencyNotification>;
    async fn find_by_id(&self, id: i64) -> DependencyResult<Option<DependencyNotification>>;
    async fn update(&self, notification: &DependencyNotification) -> DependencyResult<DependencyNotification>;
    /// Stores `notification` only while the stored row is still pending.
    /// `None` means another processor claimed it first.
    async fn claim(&self, notification: &DependencyNotification) -> DependencyResult<Option<DependencyNotification>>;
    /// Newest first.
    async fn find_by_dependency(
        &self,
        dependency_id: i64,
        limit: i64,
        offset: i64,
    ) -> DependencyResult<Page<DependencyNotification>>;
    /// Pending and due at `now`, highest priority first, then oldest first.
    async fn find_due(&self, now: DateTime<Utc>, limit: i64) -> DependencyResult<Vec<DependencyNotification>>;
}

/// 通知偏好仓储抽象
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// Exact scope lookup; `None` project means the global row.
    async fn find(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> DependencyResult<Option<NotificationPreference>>;
    /// Insert or replace the row for the preference's (user, project) scope.
    async fn upsert(&self, preference: &NotificationPreference) -> DependencyResult<NotificationPreference>;
}

/// 通知投递日志仓储抽象，只追加
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationLogRepository: Send + Sync {
    async fn append(&self, log: &NotificationLog) -> DependencyResult<NotificationLog>;
    async fn find_by_notification(&self, notification_id: i64) -> DependencyResult<Vec<NotificationLog>>;
    /// Newest first.
    async fn find_by_user(&self, user_id: UserId, query: &LogQuery) -> DependencyResult<Page<NotificationLog>>;
}

/// Every store the services need, shared behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub tasks: Arc<dyn TaskRepository>,
    pub dependencies: Arc<dyn DependencyRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub logs: Arc<dyn NotificationLogRepository>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_log_query_matches() {
        let now = Utc::now();
        let log = NotificationLog::record(1, 2, Channel::Email, DeliveryStatus::Delivered, now);

        assert!(LogQuery::default().matches(&log));
        let by_channel = LogQuery {
            channel: Some(Channel::Push),
            ..LogQuery::default()
        };
        assert!(!by_channel.matches(&log));
        let by_window = LogQuery {
            since: Some(now - Duration::hours(1)),
            until: Some(now + Duration::hours(1)),
            status: Some(DeliveryStatus::Delivered),
            ..LogQuery::default()
        };
        assert!(by_window.matches(&log));
        let too_late = LogQuery {
            since: Some(now + Duration::minutes(1)),
            ..LogQuery::default()
        };
        assert!(!too_late.matches(&log));
    }
}
