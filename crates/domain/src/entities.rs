use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use taskdeps_config::{NotificationConfig, MAX_CRITICAL_HOURS, MAX_WARNING_DAYS};
use taskdeps_errors::{DependencyError, DependencyResult};

use crate::value_objects::{
    deserialize_some, Channel, ChannelToggles, DeliveryStatus, DependencyType, EventToggles,
    Frequency, NotificationContent, NotificationPriority, NotificationStatus, NotificationType,
    ProjectId, QuietHours, Recipient, TaskId, Thresholds, UserId, ViolationState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// review counts as started work
    pub fn has_started(&self) -> bool {
        matches!(
            self,
            TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Completed
        )
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(DependencyError::validation_error(format!(
                "invalid task status: {s}"
            ))),
        }
    }
}

/// Projection of the host task the dependency subsystem reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub project_id: Option<ProjectId>,
    pub created_by: Option<UserId>,
    pub assignees: Vec<UserId>,
    pub watchers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            title: title.into(),
            status: TaskStatus::Todo,
            start_date: None,
            due_date: None,
            project_id: None,
            created_by: None,
            assignees: Vec::new(),
            watchers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Directed scheduling edge: the successor is constrained by the predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub id: i64,
    pub predecessor_task_id: TaskId,
    pub successor_task_id: TaskId,
    pub dependency_type: DependencyType,
    /// hours
    pub lag_time: i32,
    pub is_active: bool,
    pub metadata: serde_json::Value,
    pub violation_state: ViolationState,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub dependency_type: DependencyType,
    pub description: String,
    pub lag_time: i32,
    pub is_active: bool,
}

impl TaskDependency {
    pub fn from_new(new: &NewDependency, created_by: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            predecessor_task_id: new.predecessor_task_id,
            successor_task_id: new.successor_task_id,
            dependency_type: new.dependency_type,
            lag_time: new.lag_time,
            is_active: true,
            metadata: new.metadata.clone(),
            violation_state: ViolationState::None,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lag(&self) -> Duration {
        Duration::hours(i64::from(self.lag_time))
    }

    pub fn info(&self) -> DependencyInfo {
        DependencyInfo {
            dependency_type: self.dependency_type,
            description: self.dependency_type.description().to_string(),
            lag_time: self.lag_time,
            is_active: self.is_active,
        }
    }

    /// Status gate, independent of dates. An inactive dependency never blocks.
    pub fn can_proceed(&self, predecessor: TaskStatus, successor: TaskStatus) -> bool {
        if !self.is_active {
            return true;
        }
        match self.dependency_type {
            DependencyType::FinishToStart => predecessor.is_completed(),
            DependencyType::StartToStart => predecessor.has_started(),
            DependencyType::FinishToFinish => predecessor.is_completed() || !successor.is_completed(),
            DependencyType::StartToFinish => predecessor.has_started() || !successor.is_completed(),
        }
    }

    pub fn involves(&self, task_id: TaskId) -> bool {
        self.predecessor_task_id == task_id || self.successor_task_id == task_id
    }

    /// Applies mutable fields; the endpoints are fixed for the life of the record.
    pub fn apply(&mut self, update: &DependencyUpdate, actor: Option<UserId>, now: DateTime<Utc>) -> DependencyResult<()> {
        if update
            .predecessor_task_id
            .is_some_and(|p| p != self.predecessor_task_id)
            || update
                .successor_task_id
                .is_some_and(|s| s != self.successor_task_id)
        {
            return Err(DependencyError::ImmutableEndpoints { id: self.id });
        }
        if let Some(dependency_type) = update.dependency_type {
            self.dependency_type = dependency_type;
        }
        if let Some(lag_time) = update.lag_time {
            self.lag_time = lag_time;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        if let Some(metadata) = &update.metadata {
            self.metadata = metadata.clone();
        }
        self.updated_by = actor.or(self.updated_by);
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDependency {
    pub predecessor_task_id: TaskId,
    pub successor_task_id: TaskId,
    #[serde(default)]
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub lag_time: i32,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    #[serde(default = "default_true")]
    pub notify: bool,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn default_true() -> bool {
    true
}

impl NewDependency {
    pub fn new(predecessor_task_id: TaskId, successor_task_id: TaskId) -> Self {
        Self {
            predecessor_task_id,
            successor_task_id,
            dependency_type: DependencyType::default(),
            lag_time: 0,
            metadata: empty_object(),
            notify: true,
        }
    }

    pub fn with_type(mut self, dependency_type: DependencyType) -> Self {
        self.dependency_type = dependency_type;
        self
    }

    pub fn with_lag(mut self, hours: i32) -> Self {
        self.lag_time = hours;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn silent(mut self) -> Self {
        self.notify = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DependencyUpdate {
    #[serde(default)]
    pub predecessor_task_id: Option<TaskId>,
    #[serde(default)]
    pub successor_task_id: Option<TaskId>,
    #[serde(default)]
    pub dependency_type: Option<DependencyType>,
    #[serde(default)]
    pub lag_time: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// A planned or sent message about one dependency event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyNotification {
    pub id: i64,
    pub dependency_id: i64,
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub status: NotificationStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub content: NotificationContent,
    pub recipients: Vec<Recipient>,
    pub channels: Vec<Channel>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DependencyNotification {
    pub fn pending(
        dependency_id: i64,
        notification_type: NotificationType,
        priority: NotificationPriority,
        content: NotificationContent,
        recipients: Vec<Recipient>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut channels: Vec<Channel> = recipients
            .iter()
            .flat_map(|r| r.channels.iter().copied())
            .collect();
        channels.sort();
        channels.dedup();
        Self {
            id: 0,
            dependency_id,
            notification_type,
            priority,
            status: NotificationStatus::Pending,
            scheduled_at: None,
            sent_at: None,
            content,
            recipients,
            channels,
            metadata: serde_json::json!({ "retryCount": 0 }),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scheduled_for(mut self, scheduled_at: Option<DateTime<Utc>>) -> Self {
        self.scheduled_at = scheduled_at;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Pending && self.scheduled_at.map_or(true, |at| at <= now)
    }

    fn transition(&mut self, next: NotificationStatus, now: DateTime<Utc>) -> DependencyResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DependencyError::invalid_transition(
                self.status.as_str(),
                next.as_str(),
            ));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> DependencyResult<()> {
        self.transition(NotificationStatus::Sent, now)?;
        self.sent_at = Some(now);
        Ok(())
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> DependencyResult<()> {
        self.transition(NotificationStatus::Delivered, now)
    }

    pub fn mark_failed(&mut self, reason: &str, now: DateTime<Utc>) -> DependencyResult<()> {
        self.transition(NotificationStatus::Failed, now)?;
        self.set_metadata("failureReason", serde_json::json!(reason));
        self.set_metadata("failedAt", serde_json::json!(now.to_rfc3339()));
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DependencyResult<()> {
        self.transition(NotificationStatus::Cancelled, now)
    }

    /// failed -> pending, clearing the schedule so it is picked up at once.
    pub fn retry(&mut self, now: DateTime<Utc>) -> DependencyResult<()> {
        self.transition(NotificationStatus::Pending, now)?;
        let retries = self.retry_count() + 1;
        self.set_metadata("retryCount", serde_json::json!(retries));
        self.scheduled_at = None;
        self.sent_at = None;
        Ok(())
    }

    pub fn retry_count(&self) -> i64 {
        self.metadata
            .get("retryCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.metadata.get("failureReason").and_then(|v| v.as_str())
    }

    fn set_metadata(&mut self, key: &str, value: serde_json::Value) {
        if !self.metadata.is_object() {
            self.metadata = serde_json::json!({});
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

/// Append-only record of one delivery attempt or engagement signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: i64,
    pub notification_id: i64,
    pub user_id: UserId,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NotificationLog {
    pub fn record(
        notification_id: i64,
        user_id: UserId,
        channel: Channel,
        status: DeliveryStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            notification_id,
            user_id,
            channel,
            status,
            delivered_at: (status == DeliveryStatus::Delivered).then_some(now),
            opened_at: (status == DeliveryStatus::Opened).then_some(now),
            clicked_at: (status == DeliveryStatus::Clicked).then_some(now),
            failure_reason: None,
            metadata: empty_object(),
            created_at: now,
        }
    }

    pub fn failed(
        notification_id: i64,
        user_id: UserId,
        channel: Channel,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut log = Self::record(notification_id, user_id, channel, DeliveryStatus::Failed, now);
        log.failure_reason = Some(reason.into());
        log
    }
}

/// Per-user, optionally per-project notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub id: i64,
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
    pub enabled: bool,
    pub channels: ChannelToggles,
    pub events: EventToggles,
    pub frequency: Frequency,
    pub thresholds: Thresholds,
    pub quiet_hours: Option<QuietHours>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    /// Unsaved preference built from the configured defaults (id 0).
    pub fn defaults(user_id: UserId, project_id: Option<ProjectId>, config: &NotificationConfig) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            project_id,
            enabled: true,
            channels: ChannelToggles {
                email: config.channels.email,
                in_app: config.channels.in_app,
                push: config.channels.push,
            },
            events: EventToggles::default(),
            frequency: Frequency::Immediate,
            thresholds: Thresholds {
                warning_days: config.thresholds.warning_days,
                critical_hours: config.thresholds.critical_hours,
            },
            quiet_hours: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Channels this user accepts for the event, empty when muted.
    pub fn channels_for(&self, notification_type: NotificationType) -> Vec<Channel> {
        if !self.enabled || !self.events.allows(notification_type.category()) {
            return Vec::new();
        }
        self.channels.enabled_channels()
    }

    /// Nested toggle groups merge field by field; `enabled` and `quiet_hours` replace.
    pub fn apply(&mut self, update: &PreferenceUpdate, now: DateTime<Utc>) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(channels) = &update.channels {
            channels.merge_into(&mut self.channels);
        }
        if let Some(events) = &update.events {
            events.merge_into(&mut self.events);
        }
        if let Some(frequency) = update.frequency {
            self.frequency = frequency;
        }
        if let Some(thresholds) = &update.thresholds {
            if let Some(days) = thresholds.warning_days {
                self.thresholds.warning_days = days;
            }
            if let Some(hours) = thresholds.critical_hours {
                self.thresholds.critical_hours = hours;
            }
        }
        if let Some(quiet_hours) = update.quiet_hours {
            self.quiet_hours = quiet_hours;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTogglesPatch {
    pub email: Option<bool>,
    pub in_app: Option<bool>,
    pub push: Option<bool>,
}

impl ChannelTogglesPatch {
    fn merge_into(&self, target: &mut ChannelToggles) {
        target.email = self.email.unwrap_or(target.email);
        target.in_app = self.in_app.unwrap_or(target.in_app);
        target.push = self.push.unwrap_or(target.push);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventTogglesPatch {
    pub created: Option<bool>,
    pub updated: Option<bool>,
    pub violated: Option<bool>,
    pub resolved: Option<bool>,
    pub deadline_warning: Option<bool>,
    pub critical_path: Option<bool>,
}

impl EventTogglesPatch {
    fn merge_into(&self, target: &mut EventToggles) {
        target.created = self.created.unwrap_or(target.created);
        target.updated = self.updated.unwrap_or(target.updated);
        target.violated = self.violated.unwrap_or(target.violated);
        target.resolved = self.resolved.unwrap_or(target.resolved);
        target.deadline_warning = self.deadline_warning.unwrap_or(target.deadline_warning);
        target.critical_path = self.critical_path.unwrap_or(target.critical_path);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsPatch {
    pub warning_days: Option<i64>,
    pub critical_hours: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub channels: Option<ChannelTogglesPatch>,
    #[serde(default)]
    pub events: Option<EventTogglesPatch>,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub thresholds: Option<ThresholdsPatch>,
    /// `null` clears the window, absence keeps it.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub quiet_hours: Option<Option<QuietHours>>,
}

impl PreferenceUpdate {
    pub fn validate(&self) -> DependencyResult<()> {
        if let Some(Some(quiet)) = &self.quiet_hours {
            if quiet.start_hour > 23 || quiet.end_hour > 23 {
                return Err(DependencyError::validation_error(
                    "quiet hours must be between 0 and 23",
                ));
            }
            if quiet.utc_offset_minutes.abs() >= 24 * 60 {
                return Err(DependencyError::validation_error(
                    "quiet hours utc offset out of range",
                ));
            }
        }
        if let Some(thresholds) = &self.thresholds {
            if thresholds.warning_days.is_some_and(|d| !(0..=MAX_WARNING_DAYS).contains(&d)) {
                return Err(DependencyError::validation_error(format!(
                    "warning days must be between 0 and {MAX_WARNING_DAYS}"
                )));
            }
            if thresholds.critical_hours.is_some_and(|h| !(0..=MAX_CRITICAL_HOURS).contains(&h)) {
                return Err(DependencyError::validation_error(format!(
                    "critical hours must be between 0 and {MAX_CRITICAL_HOURS}"
                )));
            }
        }
        Ok(())
    }
}
