//! 通知工作者服务
//!
//! 消费 Kafka 通知请求，通过 Telegram Bot 投递，并向结果 topic 报告每条记录的处理结果。

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use notifier_shared::config::AppConfig;
use notifier_shared::kafka::{KafkaConsumer, KafkaProducer};
use notifier_shared::observability;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use notification_worker::cli::Cli;
use notification_worker::delivery::TelegramClient;
use notification_worker::pipeline::NotificationPipeline;
use notification_worker::publisher::KafkaOutcomePublisher;

const SERVICE_NAME: &str = "notification-worker";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. 加载并校验配置，任何缺失都在创建 Kafka 客户端之前终止进程
    let config = AppConfig::load(SERVICE_NAME, &cli.overrides()).context("配置无效，服务无法启动")?;

    // 2. 初始化日志与指标
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting notification-worker...");
    config.log_summary();

    // 3. 构建投递客户端、结果发布器和消费者
    let delivery = Arc::new(TelegramClient::new(&config.telegram)?);
    let producer = KafkaProducer::new(&config.kafka)?;
    let publisher = Arc::new(KafkaOutcomePublisher::new(
        producer,
        config.kafka.result_topic.clone(),
    ));
    let consumer = KafkaConsumer::new(&config.kafka)?;
    let pipeline = NotificationPipeline::from_config(&config, delivery, publisher)?;

    // 4. 关闭信号只在记录之间生效，正在处理的记录会完成并上报
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    pipeline.run(consumer, shutdown_rx).await?;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
