//! Channel senders that stay inside the process.
//!
//! External transports (SMTP, push gateways) plug in through the same
//! [`ChannelSender`] trait; this crate only ships a sender that writes the
//! delivery to the structured log, which is what the CLI wires up.

use async_trait::async_trait;
use taskdeps_domain::{Channel, ChannelSender, DependencyNotification, Recipient};
use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct TracingChannelSender {
    channel: Channel,
}

impl TracingChannelSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// One sender per channel.
    pub fn all() -> Vec<Self> {
        Channel::ALL.iter().copied().map(Self::new).collect()
    }
}

#[async_trait]
impl ChannelSender for TracingChannelSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, recipient: &Recipient, notification: &DependencyNotification) -> DependencyResult<()> {
        if !recipient.channels.contains(&self.channel) {
            return Err(DependencyError::delivery_error(format!(
                "用户 {} 未开启 {} 渠道",
                recipient.user_id, self.channel
            )));
        }
        info!(
            channel = %self.channel,
            user_id = recipient.user_id,
            notification_id = notification.id,
            dependency_id = notification.dependency_id,
            notification_type = %notification.notification_type,
            subject = %notification.content.subject,
            "notification delivered"
        );
        Ok(())
    }
}
