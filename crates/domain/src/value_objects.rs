use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use taskdeps_config::{MAX_CRITICAL_HOURS, MAX_WARNING_DAYS};
use taskdeps_errors::DependencyError;

pub type TaskId = i64;
pub type UserId = i64;
pub type ProjectId = i64;

/// The four classical scheduling relations between a predecessor and a successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum DependencyType {
    #[default]
    #[serde(rename = "FS")]
    FinishToStart,
    #[serde(rename = "SS")]
    StartToStart,
    #[serde(rename = "FF")]
    FinishToFinish,
    #[serde(rename = "SF")]
    StartToFinish,
}

/// Which end of a task a dependency constraint is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Finish,
}

impl DependencyType {
    pub const ALL: [DependencyType; 4] = [
        DependencyType::FinishToStart,
        DependencyType::StartToStart,
        DependencyType::FinishToFinish,
        DependencyType::StartToFinish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "FS",
            DependencyType::StartToStart => "SS",
            DependencyType::FinishToFinish => "FF",
            DependencyType::StartToFinish => "SF",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DependencyType::FinishToStart => "Finish-to-Start",
            DependencyType::StartToStart => "Start-to-Start",
            DependencyType::FinishToFinish => "Finish-to-Finish",
            DependencyType::StartToFinish => "Start-to-Finish",
        }
    }

    pub fn predecessor_anchor(&self) -> Anchor {
        match self {
            DependencyType::FinishToStart | DependencyType::FinishToFinish => Anchor::Finish,
            DependencyType::StartToStart | DependencyType::StartToFinish => Anchor::Start,
        }
    }

    pub fn successor_anchor(&self) -> Anchor {
        match self {
            DependencyType::FinishToStart | DependencyType::StartToStart => Anchor::Start,
            DependencyType::FinishToFinish | DependencyType::StartToFinish => Anchor::Finish,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FS" => Ok(DependencyType::FinishToStart),
            "SS" => Ok(DependencyType::StartToStart),
            "FF" => Ok(DependencyType::FinishToFinish),
            "SF" => Ok(DependencyType::StartToFinish),
            _ => Err(DependencyError::InvalidDependencyType(s.to_string())),
        }
    }
}

/// Result of evaluating a dependency constraint against task dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViolationState {
    #[default]
    None,
    Warning,
    Violation,
}

impl ViolationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationState::None => "none",
            ViolationState::Warning => "warning",
            ViolationState::Violation => "violation",
        }
    }
}

impl FromStr for ViolationState {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ViolationState::None),
            "warning" => Ok(ViolationState::Warning),
            "violation" => Ok(ViolationState::Violation),
            _ => Err(DependencyError::validation_error(format!(
                "invalid violation state: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Email,
    InApp,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::InApp, Channel::Push];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::InApp => "inApp",
            Channel::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "inApp" | "in_app" => Ok(Channel::InApp),
            "push" => Ok(Channel::Push),
            _ => Err(DependencyError::validation_error(format!("invalid channel: {s}"))),
        }
    }
}

/// Dependency lifecycle events that can produce notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DependencyCreated,
    DependencyUpdated,
    DependencyRemoved,
    DependencyViolation,
    DependencyWarning,
    DependencyResolved,
    PredecessorStarted,
    PredecessorCompleted,
    SuccessorBlocked,
    SuccessorUnblocked,
    DependencyDeadlineApproaching,
    CriticalPathChange,
}

/// Preference toggle an event type is governed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Created,
    Updated,
    Violated,
    Resolved,
    DeadlineWarning,
    CriticalPath,
}

impl NotificationType {
    pub const ALL: [NotificationType; 12] = [
        NotificationType::DependencyCreated,
        NotificationType::DependencyUpdated,
        NotificationType::DependencyRemoved,
        NotificationType::DependencyViolation,
        NotificationType::DependencyWarning,
        NotificationType::DependencyResolved,
        NotificationType::PredecessorStarted,
        NotificationType::PredecessorCompleted,
        NotificationType::SuccessorBlocked,
        NotificationType::SuccessorUnblocked,
        NotificationType::DependencyDeadlineApproaching,
        NotificationType::CriticalPathChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::DependencyCreated => "dependency_created",
            NotificationType::DependencyUpdated => "dependency_updated",
            NotificationType::DependencyRemoved => "dependency_removed",
            NotificationType::DependencyViolation => "dependency_violation",
            NotificationType::DependencyWarning => "dependency_warning",
            NotificationType::DependencyResolved => "dependency_resolved",
            NotificationType::PredecessorStarted => "predecessor_started",
            NotificationType::PredecessorCompleted => "predecessor_completed",
            NotificationType::SuccessorBlocked => "successor_blocked",
            NotificationType::SuccessorUnblocked => "successor_unblocked",
            NotificationType::DependencyDeadlineApproaching => "dependency_deadline_approaching",
            NotificationType::CriticalPathChange => "critical_path_change",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            NotificationType::DependencyCreated => EventCategory::Created,
            NotificationType::DependencyUpdated
            | NotificationType::DependencyRemoved
            | NotificationType::PredecessorStarted
            | NotificationType::PredecessorCompleted => EventCategory::Updated,
            NotificationType::DependencyViolation | NotificationType::SuccessorBlocked => {
                EventCategory::Violated
            }
            NotificationType::DependencyResolved | NotificationType::SuccessorUnblocked => {
                EventCategory::Resolved
            }
            NotificationType::DependencyWarning | NotificationType::DependencyDeadlineApproaching => {
                EventCategory::DeadlineWarning
            }
            NotificationType::CriticalPathChange => EventCategory::CriticalPath,
        }
    }

    pub fn default_priority(&self) -> NotificationPriority {
        match self {
            NotificationType::DependencyUpdated | NotificationType::DependencyRemoved => {
                NotificationPriority::Low
            }
            NotificationType::DependencyViolation | NotificationType::SuccessorBlocked => {
                NotificationPriority::High
            }
            NotificationType::CriticalPathChange => NotificationPriority::Critical,
            _ => NotificationPriority::Normal,
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DependencyError::validation_error(format!("invalid notification type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Critical => "critical",
        }
    }

    /// Numeric rank used for ordering in storage, higher is more urgent.
    pub fn rank(&self) -> i64 {
        match self {
            NotificationPriority::Low => 0,
            NotificationPriority::Normal => 1,
            NotificationPriority::High => 2,
            NotificationPriority::Critical => 3,
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(NotificationPriority::Low),
            "normal" => Ok(NotificationPriority::Normal),
            "high" => Ok(NotificationPriority::High),
            "critical" => Ok(NotificationPriority::Critical),
            _ => Err(DependencyError::validation_error(format!("invalid priority: {s}"))),
        }
    }
}

/// pending -> sent -> delivered, with failed and cancelled as terminal alternates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        }
    }

    /// `Failed -> Pending` is the retry edge.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Sent, Delivered)
                | (Sent, Failed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "delivered" => Ok(NotificationStatus::Delivered),
            "failed" => Ok(NotificationStatus::Failed),
            "cancelled" => Ok(NotificationStatus::Cancelled),
            _ => Err(DependencyError::validation_error(format!(
                "invalid notification status: {s}"
            ))),
        }
    }
}

/// Outcome recorded for one (notification, recipient, channel) attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Failed,
    Bounced,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Opened => "opened",
            DeliveryStatus::Clicked => "clicked",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Bounced => "bounced",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "opened" => Ok(DeliveryStatus::Opened),
            "clicked" => Ok(DeliveryStatus::Clicked),
            "failed" => Ok(DeliveryStatus::Failed),
            "bounced" => Ok(DeliveryStatus::Bounced),
            _ => Err(DependencyError::validation_error(format!(
                "invalid delivery status: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientRole {
    Assignee,
    Watcher,
    Creator,
    Explicit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: UserId,
    pub role: RecipientRole,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NotificationContent {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelToggles {
    pub email: bool,
    pub in_app: bool,
    pub push: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            email: true,
            in_app: true,
            push: false,
        }
    }
}

impl ChannelToggles {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::InApp => self.in_app,
            Channel::Push => self.push,
        }
    }

    pub fn enabled_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .iter()
            .copied()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventToggles {
    pub created: bool,
    pub updated: bool,
    pub violated: bool,
    pub resolved: bool,
    pub deadline_warning: bool,
    pub critical_path: bool,
}

impl Default for EventToggles {
    fn default() -> Self {
        Self {
            created: true,
            updated: true,
            violated: true,
            resolved: true,
            deadline_warning: true,
            critical_path: true,
        }
    }
}

impl EventToggles {
    pub fn allows(&self, category: EventCategory) -> bool {
        match category {
            EventCategory::Created => self.created,
            EventCategory::Updated => self.updated,
            EventCategory::Violated => self.violated,
            EventCategory::Resolved => self.resolved,
            EventCategory::DeadlineWarning => self.deadline_warning,
            EventCategory::CriticalPath => self.critical_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Immediate,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl FromStr for Frequency {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Frequency::Immediate),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            _ => Err(DependencyError::validation_error(format!("invalid frequency: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub warning_days: i64,
    pub critical_hours: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_days: 3,
            critical_hours: 24,
        }
    }
}

impl Thresholds {
    /// Out-of-range stored values saturate at the configured bounds.
    pub fn warning_window(&self) -> Duration {
        Duration::days(self.warning_days.clamp(0, MAX_WARNING_DAYS))
    }

    pub fn critical_window(&self) -> Duration {
        Duration::hours(self.critical_hours.clamp(0, MAX_CRITICAL_HOURS))
    }
}

/// Daily window in the user's local offset. `start_hour > end_hour` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl QuietHours {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            enabled: true,
            start_hour,
            end_hour,
            utc_offset_minutes: 0,
        }
    }

    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix())
    }

    fn hour_in_window(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            return false;
        }
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let local = now.with_timezone(&self.offset());
        self.hour_in_window(local.hour())
    }

    /// First instant at or after `now` that falls outside the window.
    pub fn window_end_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if !self.contains(now) {
            return now;
        }
        let offset = self.offset();
        let local = now.with_timezone(&offset);
        let mut date = local.date_naive();
        if local.hour() >= self.end_hour {
            date = date.succ_opt().unwrap_or(date);
        }
        let end = date
            .and_hms_opt(self.end_hour, 0, 0)
            .and_then(|naive| offset.from_local_datetime(&naive).single());
        match end {
            Some(end) => end.with_timezone(&Utc),
            None => now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Predecessors,
    Successors,
    #[default]
    Both,
}

impl FromStr for Direction {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "predecessor" | "predecessors" => Ok(Direction::Predecessors),
            "successor" | "successors" => Ok(Direction::Successors),
            "both" => Ok(Direction::Both),
            _ => Err(DependencyError::validation_error(format!("invalid direction: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChainDirection {
    #[default]
    Forward,
    Backward,
}

impl FromStr for ChainDirection {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(ChainDirection::Forward),
            "backward" => Ok(ChainDirection::Backward),
            _ => Err(DependencyError::validation_error(format!(
                "invalid chain direction: {s}"
            ))),
        }
    }
}

/// Deserializes a present field (including `null`) as `Some`, so that
/// `Option<Option<T>>` can tell "absent" from "explicitly cleared".
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
