//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Utc};
use taskdeps_config::NotificationConfig;
use taskdeps_domain::{
    DependencyType, EventToggles, Frequency, NotificationPreference, ProjectId, QuietHours, Task,
    TaskDependency, TaskId, TaskStatus, Thresholds, UserId, ViolationState,
};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new("test_task"),
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.task.start_date = Some(start);
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.task.due_date = Some(due);
        self
    }

    /// Start and due date in one go.
    pub fn scheduled(self, start: DateTime<Utc>, due: DateTime<Utc>) -> Self {
        self.with_start(start).with_due(due)
    }

    pub fn in_project(mut self, project_id: ProjectId) -> Self {
        self.task.project_id = Some(project_id);
        self
    }

    pub fn created_by(mut self, user_id: UserId) -> Self {
        self.task.created_by = Some(user_id);
        self
    }

    pub fn with_assignees(mut self, assignees: Vec<UserId>) -> Self {
        self.task.assignees = assignees;
        self
    }

    pub fn with_watchers(mut self, watchers: Vec<UserId>) -> Self {
        self.task.watchers = watchers;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TaskDependency entities
pub struct DependencyBuilder {
    dependency: TaskDependency,
}

impl DependencyBuilder {
    pub fn new(predecessor_task_id: TaskId, successor_task_id: TaskId) -> Self {
        let now = Utc::now();
        Self {
            dependency: TaskDependency {
                id: 0,
                predecessor_task_id,
                successor_task_id,
                dependency_type: DependencyType::FinishToStart,
                lag_time: 0,
                is_active: true,
                metadata: serde_json::json!({}),
                violation_state: ViolationState::None,
                created_by: None,
                updated_by: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.dependency.id = id;
        self
    }

    pub fn with_type(mut self, dependency_type: DependencyType) -> Self {
        self.dependency.dependency_type = dependency_type;
        self
    }

    pub fn with_lag(mut self, hours: i32) -> Self {
        self.dependency.lag_time = hours;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.dependency.is_active = false;
        self
    }

    pub fn with_violation_state(mut self, state: ViolationState) -> Self {
        self.dependency.violation_state = state;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.dependency.metadata = metadata;
        self
    }

    pub fn created_by(mut self, user_id: UserId) -> Self {
        self.dependency.created_by = Some(user_id);
        self
    }

    pub fn build(self) -> TaskDependency {
        self.dependency
    }
}

/// Builder for creating test NotificationPreference entities
pub struct PreferenceBuilder {
    preference: NotificationPreference,
}

impl PreferenceBuilder {
    pub fn new(user_id: UserId) -> Self {
        Self {
            preference: NotificationPreference::defaults(user_id, None, &NotificationConfig::default()),
        }
    }

    pub fn for_project(mut self, project_id: ProjectId) -> Self {
        self.preference.project_id = Some(project_id);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.preference.enabled = false;
        self
    }

    pub fn with_channels(mut self, email: bool, in_app: bool, push: bool) -> Self {
        self.preference.channels.email = email;
        self.preference.channels.in_app = in_app;
        self.preference.channels.push = push;
        self
    }

    pub fn with_events(mut self, events: EventToggles) -> Self {
        self.preference.events = events;
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.preference.frequency = frequency;
        self
    }

    pub fn with_thresholds(mut self, warning_days: i64, critical_hours: i64) -> Self {
        self.preference.thresholds = Thresholds {
            warning_days,
            critical_hours,
        };
        self
    }

    pub fn with_quiet_hours(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.preference.quiet_hours = Some(QuietHours::new(start_hour, end_hour));
        self
    }

    pub fn build(self) -> NotificationPreference {
        self.preference
    }
}
