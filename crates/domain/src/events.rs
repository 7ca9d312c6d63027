//! 领域事件
//!
//! 依赖关系生命周期事件，由服务层产生，交给通知策略处理

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{NotificationPriority, NotificationType, TaskId};

/// 领域事件基础trait
pub trait DomainEvent: Send + Sync {
    fn event_type(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn aggregate_id(&self) -> String;
}

/// Something happened to one dependency that people may need to hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEvent {
    pub kind: NotificationType,
    pub dependency_id: i64,
    pub predecessor_task_id: TaskId,
    pub successor_task_id: TaskId,
    pub priority: NotificationPriority,
    /// merged into the rendered notification's `data`
    pub data: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DependencyEvent {
    pub fn new(
        kind: NotificationType,
        dependency_id: i64,
        predecessor_task_id: TaskId,
        successor_task_id: TaskId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            dependency_id,
            predecessor_task_id,
            successor_task_id,
            priority: kind.default_priority(),
            data: serde_json::Value::Null,
            occurred_at,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

impl DomainEvent for DependencyEvent {
    fn event_type(&self) -> &str {
        self.kind.as_str()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn aggregate_id(&self) -> String {
        self.dependency_id.to_string()
    }
}
