use std::sync::Arc;

use anyhow::{Context, Result};
use taskdeps_config::AppConfig;
use taskdeps_domain::{
    ChannelSender, Clock, DependencyService, NotificationDelivery, Repositories, SystemClock,
};
use taskdeps_infrastructure::{DatabaseManager, TracingChannelSender};
use tracing::info;

/// Wired application: database, dependency service and delivery pipeline
/// sharing one set of repositories.
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    repositories: Repositories,
    service: DependencyService,
    delivery: NotificationDelivery,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Opens the database, applies the schema and builds the services.
    pub async fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        info!(database = %config.database.url, "初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("数据库迁移失败")?;

        let repositories = database.repositories();
        let service = DependencyService::new(
            repositories.clone(),
            &config.notifications,
            &config.violations,
        )
        .with_clock(clock.clone());

        let mut delivery = NotificationDelivery::new(
            repositories.notifications.clone(),
            repositories.logs.clone(),
        )
        .with_clock(clock);
        for sender in TracingChannelSender::all() {
            delivery = delivery.with_sender(Arc::new(sender) as Arc<dyn ChannelSender>);
        }

        Ok(Self {
            config,
            database,
            repositories,
            service,
            delivery,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    pub fn service(&self) -> &DependencyService {
        &self.service
    }

    pub fn delivery(&self) -> &NotificationDelivery {
        &self.delivery
    }

    pub async fn shutdown(&self) {
        self.database.close().await;
        info!("数据库连接已关闭");
    }
}
