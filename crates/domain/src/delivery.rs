//! Hands pending notifications to channel senders and keeps the delivery log.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::entities::{DependencyNotification, NotificationLog};
use crate::repositories::{LogQuery, NotificationLogRepository, NotificationRepository, Page};
use crate::value_objects::{Channel, DeliveryStatus, NotificationStatus, Recipient, UserId};

/// Transport for one channel (email, in-app, push).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;
    async fn send(&self, recipient: &Recipient, notification: &DependencyNotification) -> DependencyResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub notification: DependencyNotification,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: usize,
    pub by_channel: BTreeMap<Channel, BTreeMap<DeliveryStatus, usize>>,
    pub by_status: BTreeMap<DeliveryStatus, usize>,
}

impl DeliveryStats {
    pub fn from_logs(logs: &[NotificationLog]) -> Self {
        let mut stats = Self {
            total: logs.len(),
            ..Self::default()
        };
        for log in logs {
            *stats
                .by_channel
                .entry(log.channel)
                .or_default()
                .entry(log.status)
                .or_default() += 1;
            *stats.by_status.entry(log.status).or_default() += 1;
        }
        stats
    }
}

pub struct NotificationDelivery {
    notifications: Arc<dyn NotificationRepository>,
    logs: Arc<dyn NotificationLogRepository>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    clock: Arc<dyn Clock>,
}

impl NotificationDelivery {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        logs: Arc<dyn NotificationLogRepository>,
    ) -> Self {
        Self {
            notifications,
            logs,
            senders: HashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Registers a sender, replacing any previous one for the same channel.
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn load(&self, id: i64) -> DependencyResult<DependencyNotification> {
        self.notifications
            .find_by_id(id)
            .await?
            .ok_or_else(|| DependencyError::notification_not_found(id))
    }

    /// pending -> sent, one log row per (recipient, channel) attempt, then
    /// delivered unless every attempt failed.
    #[instrument(skip(self))]
    pub async fn process(&self, id: i64) -> DependencyResult<DeliveryOutcome> {
        let mut notification = self.load(id).await?;
        notification.mark_sent(self.clock.now())?;
        let Some(mut notification) = self.notifications.claim(&notification).await? else {
            let current = self.load(id).await?;
            debug!(notification_id = id, status = %current.status, "notification already claimed");
            return Err(DependencyError::invalid_transition(
                current.status.as_str(),
                NotificationStatus::Sent.as_str(),
            ));
        };

        match self.attempt_all(&notification).await {
            Ok((delivered, failed)) => {
                let now = self.clock.now();
                if delivered == 0 && failed > 0 {
                    notification.mark_failed("all delivery attempts failed", now)?;
                } else {
                    notification.mark_delivered(now)?;
                }
                let notification = self.notifications.update(&notification).await?;
                info!(
                    notification_id = id,
                    status = %notification.status,
                    delivered,
                    failed,
                    "notification processed"
                );
                Ok(DeliveryOutcome {
                    notification,
                    delivered,
                    failed,
                })
            }
            Err(err) => {
                warn!(notification_id = id, error = %err, "notification processing aborted");
                notification.mark_failed(&err.to_string(), self.clock.now())?;
                self.notifications.update(&notification).await?;
                Err(err)
            }
        }
    }

    async fn attempt_all(&self, notification: &DependencyNotification) -> DependencyResult<(usize, usize)> {
        let mut delivered = 0;
        let mut failed = 0;
        for recipient in &notification.recipients {
            for channel in &recipient.channels {
                let now = self.clock.now();
                let log = match self.senders.get(channel) {
                    None => NotificationLog::failed(
                        notification.id,
                        recipient.user_id,
                        *channel,
                        format!("no sender registered for channel {channel}"),
                        now,
                    ),
                    Some(sender) => match sender.send(recipient, notification).await {
                        Ok(()) => NotificationLog::record(
                            notification.id,
                            recipient.user_id,
                            *channel,
                            DeliveryStatus::Delivered,
                            now,
                        ),
                        Err(err) => {
                            warn!(
                                notification_id = notification.id,
                                user_id = recipient.user_id,
                                channel = channel.as_str(),
                                error = %err,
                                "channel delivery failed"
                            );
                            NotificationLog::failed(notification.id, recipient.user_id, *channel, err.to_string(), now)
                        }
                    },
                };
                if log.status == DeliveryStatus::Delivered {
                    delivered += 1;
                } else {
                    failed += 1;
                }
                self.logs.append(&log).await?;
            }
        }
        Ok((delivered, failed))
    }

    /// Processes notifications that are due, highest priority first. A
    /// failure on one notification does not stop the batch.
    pub async fn process_due(&self, limit: i64) -> DependencyResult<Vec<DeliveryOutcome>> {
        let due = self.notifications.find_due(self.clock.now(), limit).await?;
        debug!(count = due.len(), "processing due notifications");
        let mut outcomes = Vec::with_capacity(due.len());
        for notification in due {
            match self.process(notification.id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(notification_id = notification.id, error = %err, "skipping notification"),
            }
        }
        Ok(outcomes)
    }

    pub async fn retry(&self, id: i64) -> DependencyResult<DependencyNotification> {
        let mut notification = self.load(id).await?;
        notification.retry(self.clock.now())?;
        let notification = self.notifications.update(&notification).await?;
        info!(notification_id = id, retry_count = notification.retry_count(), "notification requeued");
        Ok(notification)
    }

    pub async fn cancel(&self, id: i64) -> DependencyResult<DependencyNotification> {
        let mut notification = self.load(id).await?;
        notification.cancel(self.clock.now())?;
        self.notifications.update(&notification).await
    }

    pub async fn mark_opened(&self, notification_id: i64, user_id: UserId, channel: Channel) -> DependencyResult<NotificationLog> {
        self.record_engagement(notification_id, user_id, channel, DeliveryStatus::Opened)
            .await
    }

    pub async fn mark_clicked(&self, notification_id: i64, user_id: UserId, channel: Channel) -> DependencyResult<NotificationLog> {
        self.record_engagement(notification_id, user_id, channel, DeliveryStatus::Clicked)
            .await
    }

    /// Engagement is appended as a new row; earlier rows are never touched.
    async fn record_engagement(
        &self,
        notification_id: i64,
        user_id: UserId,
        channel: Channel,
        status: DeliveryStatus,
    ) -> DependencyResult<NotificationLog> {
        self.load(notification_id).await?;
        let delivered = self
            .logs
            .find_by_notification(notification_id)
            .await?
            .iter()
            .any(|log| {
                log.user_id == user_id && log.channel == channel && log.status == DeliveryStatus::Delivered
            });
        if !delivered {
            return Err(DependencyError::validation_error(format!(
                "notification {notification_id} was not delivered to user {user_id} via {channel}"
            )));
        }
        let log = NotificationLog::record(notification_id, user_id, channel, status, self.clock.now());
        self.logs.append(&log).await
    }

    pub async fn notification_history(
        &self,
        dependency_id: i64,
        limit: i64,
        offset: i64,
    ) -> DependencyResult<Page<DependencyNotification>> {
        self.notifications
            .find_by_dependency(dependency_id, limit, offset)
            .await
    }

    pub async fn user_history(&self, user_id: UserId, query: &LogQuery) -> DependencyResult<Page<NotificationLog>> {
        self.logs.find_by_user(user_id, query).await
    }

    pub async fn delivery_stats(&self, notification_id: i64) -> DependencyResult<DeliveryStats> {
        self.load(notification_id).await?;
        let logs = self.logs.find_by_notification(notification_id).await?;
        Ok(DeliveryStats::from_logs(&logs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_delivery_stats_from_logs() {
        let now = Utc::now();
        let logs = vec![
            NotificationLog::record(1, 2, Channel::Email, DeliveryStatus::Delivered, now),
            NotificationLog::record(1, 2, Channel::InApp, DeliveryStatus::Delivered, now),
            NotificationLog::record(1, 2, Channel::InApp, DeliveryStatus::Opened, now),
            NotificationLog::failed(1, 3, Channel::Email, "bounce", now),
        ];
        let stats = DeliveryStats::from_logs(&logs);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_status[&DeliveryStatus::Delivered], 2);
        assert_eq!(stats.by_status[&DeliveryStatus::Failed], 1);
        assert_eq!(stats.by_channel[&Channel::InApp].len(), 2);
        assert_eq!(stats.by_channel[&Channel::Email][&DeliveryStatus::Failed], 1);
    }

    use crate::repositories::{MockNotificationLogRepository, MockNotificationRepository};
    use crate::value_objects::{NotificationPriority, NotificationStatus, NotificationType, RecipientRole};

    fn pending(channels: Vec<Channel>) -> DependencyNotification {
        let mut notification = DependencyNotification::pending(
            3,
            NotificationType::DependencyViolation,
            NotificationPriority::High,
            Default::default(),
            vec![Recipient {
                user_id: 8,
                role: RecipientRole::Assignee,
                channels,
            }],
            Utc::now(),
        );
        notification.id = 5;
        notification
    }

    fn sender(channel: Channel, ok: bool) -> Arc<dyn ChannelSender> {
        let mut sender = MockChannelSender::new();
        sender.expect_channel().return_const(channel);
        sender.expect_send().returning(move |_, _| {
            if ok {
                Ok(())
            } else {
                Err(DependencyError::delivery_error("smtp down"))
            }
        });
        Arc::new(sender)
    }

    fn repositories(
        stored: DependencyNotification,
        attempts: usize,
    ) -> (MockNotificationRepository, MockNotificationLogRepository) {
        let mut notifications = MockNotificationRepository::new();
        notifications
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        notifications.expect_claim().returning(|n| Ok(Some(n.clone())));
        notifications.expect_update().returning(|n| Ok(n.clone()));
        let mut logs = MockNotificationLogRepository::new();
        logs.expect_append().times(attempts).returning(|l| Ok(l.clone()));
        (notifications, logs)
    }

    #[tokio::test]
    async fn test_process_logs_each_attempt() {
        let (notifications, logs) = repositories(pending(vec![Channel::Email, Channel::InApp]), 2);
        let delivery = NotificationDelivery::new(Arc::new(notifications), Arc::new(logs))
            .with_sender(sender(Channel::Email, false))
            .with_sender(sender(Channel::InApp, true));

        let outcome = delivery.process(5).await.unwrap();
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.notification.status, NotificationStatus::Delivered);
        assert!(outcome.notification.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_process_marks_failed_when_every_attempt_fails() {
        let (notifications, logs) = repositories(pending(vec![Channel::Email, Channel::Push]), 2);
        // push has no registered sender
        let delivery = NotificationDelivery::new(Arc::new(notifications), Arc::new(logs))
            .with_sender(sender(Channel::Email, false));

        let outcome = delivery.process(5).await.unwrap();
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.notification.status, NotificationStatus::Failed);
        assert_eq!(
            outcome.notification.failure_reason(),
            Some("all delivery attempts failed")
        );
    }

    #[tokio::test]
    async fn test_process_rejects_non_pending() {
        let mut delivered = pending(vec![Channel::InApp]);
        delivered.status = NotificationStatus::Delivered;
        let (notifications, logs) = repositories(delivered, 0);
        let delivery = NotificationDelivery::new(Arc::new(notifications), Arc::new(logs));

        let err = delivery.process(5).await.unwrap_err();
        assert!(matches!(err, DependencyError::InvalidStatusTransition { .. }));
    }

    #[tokio::test]
    async fn test_process_skips_notification_claimed_elsewhere() {
        let stored = pending(vec![Channel::InApp]);
        let mut notifications = MockNotificationRepository::new();
        notifications
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        notifications.expect_claim().times(1).returning(|_| Ok(None));
        notifications.expect_update().never();
        let mut logs = MockNotificationLogRepository::new();
        logs.expect_append().never();
        let mut in_app = MockChannelSender::new();
        in_app.expect_channel().return_const(Channel::InApp);
        in_app.expect_send().never();
        let delivery = NotificationDelivery::new(Arc::new(notifications), Arc::new(logs))
            .with_sender(Arc::new(in_app));

        let err = delivery.process(5).await.unwrap_err();
        assert!(matches!(err, DependencyError::InvalidStatusTransition { .. }));
    }

    #[tokio::test]
    async fn test_mark_opened_requires_delivery() {
        let stored = pending(vec![Channel::InApp]);
        let mut notifications = MockNotificationRepository::new();
        notifications
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        let mut logs = MockNotificationLogRepository::new();
        logs.expect_find_by_notification().returning(|id| {
            Ok(vec![NotificationLog::record(
                id,
                8,
                Channel::InApp,
                DeliveryStatus::Delivered,
                Utc::now(),
            )])
        });
        logs.expect_append().times(1).returning(|l| Ok(l.clone()));
        let delivery = NotificationDelivery::new(Arc::new(notifications), Arc::new(logs));

        let opened = delivery.mark_opened(5, 8, Channel::InApp).await.unwrap();
        assert_eq!(opened.status, DeliveryStatus::Opened);
        assert!(opened.opened_at.is_some());

        assert!(delivery.mark_opened(5, 9, Channel::InApp).await.is_err());
    }
}
