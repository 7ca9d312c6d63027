use anyhow::{Context, Result};
use taskdeps::{build_cli, execute, init_logging, Application};
use taskdeps_config::{AppConfig, LogLevel, OutputFormat};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = build_cli().get_matches();

    let config_path = matches.get_one::<String>("config");

    // 加载配置
    let mut config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("<默认位置>")
        )
    })?;

    // 命令行参数覆盖配置文件
    if let Some(url) = matches.get_one::<String>("database") {
        config.database.url = url.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }

    // 初始化日志系统
    init_logging(&config.logging)?;

    info!(command = matches.subcommand_name().unwrap_or_default(), "启动任务依赖服务");

    let app = Application::new(config).await?;

    let result = execute(&app, &matches).await;
    app.shutdown().await;

    match result {
        Ok(output) => {
            let rendered = serde_json::to_string_pretty(&output).context("序列化输出失败")?;
            println!("{rendered}");
            Ok(())
        }
        Err(e) => {
            error!("命令执行失败: {e:#}");
            Err(e)
        }
    }
}
