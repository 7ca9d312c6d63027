use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    logging::LogConfig,
    notifications::{NotificationConfig, ViolationConfig},
};
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LogConfig,
    pub notifications: NotificationConfig,
    pub violations: ViolationConfig,
}

impl AppConfig {
    /// 加载配置: 配置文件 -> TASKDEPS_ 环境变量覆盖 -> 校验
    ///
    /// Without an explicit path the well-known locations are probed; when none
    /// exists the built-in defaults are used.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/taskdeps.toml",
                "taskdeps.toml",
                "/etc/taskdeps/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TASKDEPS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.logging.validate()?;
        self.notifications.validate()?;
        self.violations.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogLevel, OutputFormat};
    use chrono::Weekday;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite://taskdeps.db");
        assert_eq!(config.notifications.daily_digest_hour, 9);
        assert_eq!(config.violations.warning_days, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_serialization() {
        let config = AppConfig::default();
        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: AppConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(config.database.url, deserialized.database.url);
        assert_eq!(config.notifications, deserialized.notifications);
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[database]
url = "sqlite::memory:"
max_connections = 1
min_connections = 1

[logging]
level = "debug"
format = "json"

[notifications]
daily_digest_hour = 7
weekly_digest_weekday = "Fri"

[notifications.channels]
push = true

[notifications.thresholds]
warning_days = 5
critical_hours = 12

[violations]
warning_days = 1
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, OutputFormat::Json);
        assert_eq!(config.notifications.daily_digest_hour, 7);
        assert_eq!(config.notifications.weekly_digest_weekday, Weekday::Fri);
        assert!(config.notifications.channels.push);
        assert!(config.notifications.channels.email);
        assert_eq!(config.notifications.thresholds.warning_days, 5);
        assert_eq!(config.violations.warning_days, 1);
    }

    #[test]
    fn test_app_config_from_toml_rejects_invalid_values() {
        let toml_str = r#"
[notifications]
daily_digest_hour = 30
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\nmax_connections = 1\n\n[violations]\nwarning_days = 2"
        )
        .expect("write config");

        let path = file.path().to_str().expect("utf-8 path").to_string();
        let config = AppConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.violations.warning_days, 2);
        assert_eq!(config.notifications.thresholds.critical_hours, 24);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_to_toml_round_trip() {
        let config = AppConfig::default();
        let rendered = config.to_toml().expect("render toml");
        let parsed = AppConfig::from_toml(&rendered).expect("parse rendered toml");
        assert_eq!(parsed.notifications, config.notifications);
        assert_eq!(parsed.database.url, config.database.url);
    }
}
