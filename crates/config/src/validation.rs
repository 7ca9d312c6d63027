use crate::ConfigResult;

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 3600 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600"
            )));
        }
        Ok(())
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > 10000 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 10000"
            )));
        }
        Ok(())
    }

    /// Validate an hour of the day (0-23)
    pub fn validate_hour(hour: u32, field_name: &str) -> ConfigResult<()> {
        if hour > 23 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be between 0 and 23"
            )));
        }
        Ok(())
    }

    pub fn validate_non_negative(value: i64, field_name: &str) -> ConfigResult<()> {
        if value < 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be negative"
            )));
        }
        Ok(())
    }

    pub fn validate_range(value: i64, min: i64, max: i64, field_name: &str) -> ConfigResult<()> {
        if value < min || value > max {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be between {min} and {max}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hour() {
        assert!(ValidationUtils::validate_hour(0, "h").is_ok());
        assert!(ValidationUtils::validate_hour(23, "h").is_ok());
        assert!(ValidationUtils::validate_hour(24, "h").is_err());
    }

    #[test]
    fn test_validate_count_bounds() {
        assert!(ValidationUtils::validate_count(0, "n").is_err());
        assert!(ValidationUtils::validate_count(5, "n").is_ok());
        assert!(ValidationUtils::validate_count(10001, "n").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(ValidationUtils::validate_range(0, 0, 365, "days").is_ok());
        assert!(ValidationUtils::validate_range(365, 0, 365, "days").is_ok());
        assert!(ValidationUtils::validate_range(366, 0, 365, "days").is_err());
        assert!(ValidationUtils::validate_range(-1, 0, 365, "days").is_err());
    }

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("  ", "url").is_err());
        assert!(ValidationUtils::validate_not_empty("sqlite::memory:", "url").is_ok());
    }
}
