//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use std::net::SocketAddr;

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => config.service_name.clone())
        .increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 端点的 HELP 注释中
pub fn describe_metrics() {
    metrics::describe_counter!(
        "notifications_processed_total",
        "Total number of consumed notification records, by result"
    );
    metrics::describe_histogram!(
        "notification_processing_duration_seconds",
        "Time from record read to outcome event built"
    );
    metrics::describe_counter!(
        "outcome_publish_failures_total",
        "Outcome events that could not be written to the result topic"
    );
    metrics::describe_counter!(
        "consumer_read_failures_total",
        "Queue-level read errors reported by the consumer"
    );
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一条通知记录的处理结果
#[inline]
pub fn record_notification(success: bool, duration_secs: f64) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("notifications_processed_total", "result" => result).increment(1);
    metrics::histogram!("notification_processing_duration_seconds", "result" => result)
        .record(duration_secs);
}

/// 记录结果事件发布失败
#[inline]
pub fn record_publish_failure() {
    metrics::counter!("outcome_publish_failures_total").increment(1);
}

/// 记录消费端读取失败
#[inline]
pub fn record_read_failure() {
    metrics::counter!("consumer_read_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        describe_metrics();
        record_notification(true, 0.12);
        record_notification(false, 0.0);
        record_publish_failure();
        record_read_failure();
    }
}
