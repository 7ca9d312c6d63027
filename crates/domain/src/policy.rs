//! Who is told about a dependency event, on which channels, and when.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use taskdeps_config::NotificationConfig;

use crate::entities::{NotificationPreference, Task, TaskDependency};
use crate::value_objects::{
    Channel, Frequency, NotificationPriority, NotificationType, Recipient, RecipientRole, Thresholds, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Delivery {
    Immediate,
    Deferred { scheduled_at: DateTime<Utc> },
}

impl Delivery {
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Delivery::Immediate => None,
            Delivery::Deferred { scheduled_at } => Some(*scheduled_at),
        }
    }
}

/// A candidate recipient with the preference that governs them.
#[derive(Debug, Clone)]
pub struct RecipientContext {
    pub user_id: UserId,
    pub role: RecipientRole,
    pub preference: NotificationPreference,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNotification {
    pub recipient: Recipient,
    pub priority: NotificationPriority,
    pub delivery: Delivery,
}

/// People attached to either task, deduplicated. The first role seen wins:
/// assignees, then watchers, then creators.
pub fn collect_recipients(
    dependency: &TaskDependency,
    predecessor: &Task,
    successor: &Task,
    include_dependency_creator: bool,
) -> Vec<(UserId, RecipientRole)> {
    let mut candidates: Vec<(UserId, RecipientRole)> = Vec::new();
    for task in [successor, predecessor] {
        candidates.extend(task.assignees.iter().map(|u| (*u, RecipientRole::Assignee)));
    }
    for task in [successor, predecessor] {
        candidates.extend(task.watchers.iter().map(|u| (*u, RecipientRole::Watcher)));
    }
    if include_dependency_creator {
        candidates.extend(dependency.created_by.map(|u| (u, RecipientRole::Creator)));
    }
    for task in [successor, predecessor] {
        candidates.extend(task.created_by.map(|u| (u, RecipientRole::Creator)));
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|(user, _)| seen.insert(*user));
    candidates
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationPolicy {
    digest_hour: u32,
    digest_weekday: Weekday,
}

impl NotificationPolicy {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            digest_hour: config.daily_digest_hour.min(23),
            digest_weekday: config.weekly_digest_weekday,
        }
    }

    /// Plans for every recipient that accepts at least one channel for this
    /// event. `priority_for` may drop a recipient by returning `None`.
    pub fn plan<F>(
        &self,
        notification_type: NotificationType,
        recipients: &[RecipientContext],
        now: DateTime<Utc>,
        priority_for: F,
    ) -> Vec<PlannedNotification>
    where
        F: Fn(&NotificationPreference) -> Option<NotificationPriority>,
    {
        recipients
            .iter()
            .flat_map(|ctx| {
                let channels = ctx.preference.channels_for(notification_type);
                if channels.is_empty() {
                    return Vec::new();
                }
                match priority_for(&ctx.preference) {
                    Some(priority) => self.plans_for(ctx, channels, priority, now),
                    None => Vec::new(),
                }
            })
            .collect()
    }

    /// In-app delivery ignores quiet hours, so a quiet-hours deferral
    /// splits the recipient into an immediate in-app plan and a deferred one.
    fn plans_for(
        &self,
        ctx: &RecipientContext,
        channels: Vec<Channel>,
        priority: NotificationPriority,
        now: DateTime<Utc>,
    ) -> Vec<PlannedNotification> {
        let delivery = self.resolve_delivery(&ctx.preference, priority, now);
        let plan = |channels: Vec<Channel>, delivery: Delivery| PlannedNotification {
            recipient: Recipient {
                user_id: ctx.user_id,
                role: ctx.role,
                channels,
            },
            priority,
            delivery,
        };
        if !self.held_by_quiet_hours(&ctx.preference, priority, now) {
            return vec![plan(channels, delivery)];
        }
        let (in_app, held): (Vec<Channel>, Vec<Channel>) =
            channels.into_iter().partition(|c| *c == Channel::InApp);
        [(in_app, Delivery::Immediate), (held, delivery)]
            .into_iter()
            .filter(|(channels, _)| !channels.is_empty())
            .map(|(channels, delivery)| plan(channels, delivery))
            .collect()
    }

    fn held_by_quiet_hours(
        &self,
        preference: &NotificationPreference,
        priority: NotificationPriority,
        now: DateTime<Utc>,
    ) -> bool {
        priority != NotificationPriority::Critical
            && preference.frequency == Frequency::Immediate
            && preference.quiet_hours.is_some_and(|quiet| quiet.contains(now))
    }

    pub fn plan_uniform(
        &self,
        notification_type: NotificationType,
        priority: NotificationPriority,
        recipients: &[RecipientContext],
        now: DateTime<Utc>,
    ) -> Vec<PlannedNotification> {
        self.plan(notification_type, recipients, now, |_| Some(priority))
    }

    /// Critical always goes out at once. Daily and weekly frequencies batch
    /// to the next digest slot; immediate defers only inside quiet hours.
    pub fn resolve_delivery(
        &self,
        preference: &NotificationPreference,
        priority: NotificationPriority,
        now: DateTime<Utc>,
    ) -> Delivery {
        if priority == NotificationPriority::Critical {
            return Delivery::Immediate;
        }
        match preference.frequency {
            Frequency::Daily => Delivery::Deferred {
                scheduled_at: self.next_daily_digest(now),
            },
            Frequency::Weekly => Delivery::Deferred {
                scheduled_at: self.next_weekly_digest(now),
            },
            Frequency::Immediate => match preference.quiet_hours {
                Some(quiet) if quiet.contains(now) => Delivery::Deferred {
                    scheduled_at: quiet.window_end_after(now),
                },
                _ => Delivery::Immediate,
            },
        }
    }

    pub fn next_daily_digest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let slot = self.slot_on(now, 0);
        if slot > now {
            slot
        } else {
            slot + Duration::days(1)
        }
    }

    pub fn next_weekly_digest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let target = i64::from(self.digest_weekday.num_days_from_monday());
        let today = i64::from(now.weekday().num_days_from_monday());
        let slot = self.slot_on(now, (target - today).rem_euclid(7));
        if slot > now {
            slot
        } else {
            slot + Duration::days(7)
        }
    }

    fn slot_on(&self, now: DateTime<Utc>, days_ahead: i64) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(self.digest_hour, 0, 0).unwrap_or_default();
        (now.date_naive() + Duration::days(days_ahead))
            .and_time(time)
            .and_utc()
    }

    /// Priority for an approaching predecessor deadline, `None` when it is
    /// outside the warning window or already past.
    pub fn deadline_priority(thresholds: &Thresholds, remaining: Duration) -> Option<NotificationPriority> {
        if remaining < Duration::zero() {
            None
        } else if remaining <= thresholds.critical_window() {
            Some(NotificationPriority::Critical)
        } else if remaining <= thresholds.warning_window() {
            Some(NotificationPriority::High)
        } else {
            None
        }
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self::new(&NotificationConfig::default())
    }
}
