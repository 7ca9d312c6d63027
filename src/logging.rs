use anyhow::{Context, Result};
use taskdeps_config::{LogConfig, OutputFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays machine readable.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        OutputFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("初始化JSON日志格式失败")?,
        OutputFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("初始化文本日志格式失败")?,
        OutputFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .context("初始化Pretty日志格式失败")?,
    }

    Ok(())
}
