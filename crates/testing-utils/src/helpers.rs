//! Test helper utilities and common testing patterns
//!
//! A clock tests can move by hand, a channel sender that records what it was
//! asked to deliver, and fixed dates to anchor schedules on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use taskdeps_domain::{Channel, ChannelSender, Clock, DependencyNotification, Recipient, UserId};
use taskdeps_errors::{DependencyError, DependencyResult};

/// Fixed reference point for schedule fixtures: 2025-07-01 00:00 UTC (a Tuesday).
pub fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// `n` days after [`base_date`].
pub fn day(n: i64) -> DateTime<Utc> {
    base_date() + Duration::days(n)
}

/// `hour` o'clock on day `n`.
pub fn day_at(n: i64, hour: i64) -> DateTime<Utc> {
    day(n) + Duration::hours(hour)
}

/// Clock whose time only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(base_date())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// One call observed by a [`RecordingSender`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub notification_id: i64,
    pub user_id: UserId,
    pub channel: Channel,
    pub subject: String,
}

/// Channel sender that remembers every delivery and can be told to fail
/// for particular users.
#[derive(Debug, Clone)]
pub struct RecordingSender {
    channel: Channel,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing_users: Arc<Mutex<HashSet<UserId>>>,
}

impl RecordingSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            sent: Arc::new(Mutex::new(Vec::new())),
            failing_users: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn fail_for(&self, user_id: UserId) {
        self.failing_users.lock().unwrap().insert(user_id);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: UserId) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, recipient: &Recipient, notification: &DependencyNotification) -> DependencyResult<()> {
        if self.failing_users.lock().unwrap().contains(&recipient.user_id) {
            return Err(DependencyError::delivery_error(format!(
                "{} unreachable for user {}",
                self.channel.as_str(),
                recipient.user_id
            )));
        }
        self.sent.lock().unwrap().push(SentMessage {
            notification_id: notification.id,
            user_id: recipient.user_id,
            channel: self.channel,
            subject: notification.content.subject.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};

    #[test]
    fn test_fixtures_are_anchored() {
        assert_eq!(base_date().weekday(), Weekday::Tue);
        assert_eq!(day(10) - day(0), Duration::days(10));
        assert_eq!(day_at(1, 6) - day(1), Duration::hours(6));
    }

    #[test]
    fn test_fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(day(0));
        assert_eq!(clock.now(), day(0));
        clock.advance(Duration::hours(5));
        assert_eq!(clock.now(), day_at(0, 5));
        clock.set(day(3));
        assert_eq!(clock.now(), day(3));
    }
}
