use crate::validation::{ConfigValidator, ValidationUtils};
use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Upper bound for any warning window, in days.
pub const MAX_WARNING_DAYS: i64 = 365;
/// Upper bound for the critical window, in hours.
pub const MAX_CRITICAL_HOURS: i64 = 8760;

/// Channels enabled for a user who never saved preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelDefaults {
    pub email: bool,
    pub in_app: bool,
    pub push: bool,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            email: true,
            in_app: true,
            push: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdDefaults {
    pub warning_days: i64,
    pub critical_hours: i64,
}

impl Default for ThresholdDefaults {
    fn default() -> Self {
        Self {
            warning_days: 3,
            critical_hours: 24,
        }
    }
}

/// Global notification defaults and batching schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channels: ChannelDefaults,
    pub thresholds: ThresholdDefaults,
    /// UTC hour at which daily and weekly batches are released.
    pub daily_digest_hour: u32,
    pub weekly_digest_weekday: Weekday,
    pub include_dependency_creator: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channels: ChannelDefaults::default(),
            thresholds: ThresholdDefaults::default(),
            daily_digest_hour: 9,
            weekly_digest_weekday: Weekday::Mon,
            include_dependency_creator: true,
        }
    }
}

impl ConfigValidator for NotificationConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_hour(self.daily_digest_hour, "notifications.daily_digest_hour")?;
        ValidationUtils::validate_range(
            self.thresholds.warning_days,
            0,
            MAX_WARNING_DAYS,
            "notifications.thresholds.warning_days",
        )?;
        ValidationUtils::validate_range(
            self.thresholds.critical_hours,
            0,
            MAX_CRITICAL_HOURS,
            "notifications.thresholds.critical_hours",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationConfig {
    /// Warning window applied when no recipient preference is in play.
    pub warning_days: i64,
}

impl Default for ViolationConfig {
    fn default() -> Self {
        Self { warning_days: 3 }
    }
}

impl ConfigValidator for ViolationConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(
            self.warning_days,
            0,
            MAX_WARNING_DAYS,
            "violations.warning_days",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_defaults() {
        let config = NotificationConfig::default();
        assert!(config.channels.email);
        assert!(config.channels.in_app);
        assert!(!config.channels.push);
        assert_eq!(config.thresholds.warning_days, 3);
        assert_eq!(config.thresholds.critical_hours, 24);
        assert_eq!(config.weekly_digest_weekday, Weekday::Mon);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_digest_hour() {
        let config = NotificationConfig {
            daily_digest_hour: 24,
            ..NotificationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_thresholds_rejected() {
        let mut config = NotificationConfig::default();
        config.thresholds.critical_hours = -1;
        assert!(config.validate().is_err());

        let violations = ViolationConfig { warning_days: -2 };
        assert!(violations.validate().is_err());
    }

    #[test]
    fn test_oversized_thresholds_rejected() {
        let mut config = NotificationConfig::default();
        config.thresholds.warning_days = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = NotificationConfig::default();
        config.thresholds.critical_hours = MAX_CRITICAL_HOURS + 1;
        assert!(config.validate().is_err());

        let violations = ViolationConfig { warning_days: i64::MAX };
        assert!(violations.validate().is_err());
        let violations = ViolationConfig { warning_days: MAX_WARNING_DAYS };
        assert!(violations.validate().is_ok());
    }
}
