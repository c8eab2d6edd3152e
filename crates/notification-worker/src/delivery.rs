//! Telegram 消息投递客户端
//!
//! 通过 `DeliveryClient` trait 抽象投递行为，消息管道只依赖该 trait，
//! 测试时可替换为 mock 实现。

use std::time::Duration;

use async_trait::async_trait;
use notifier_shared::config::TelegramConfig;
use notifier_shared::error::NotifierError;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::DeliveryError;

/// 消息投递接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// 向 `recipient_id` 发送文本消息
    ///
    /// 两个参数都必须非空；空值说明上游校验被绕过，属于编程错误，直接 panic。
    async fn deliver(&self, recipient_id: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Telegram Bot API 客户端
///
/// token 来自启动时加载的配置，拼接在请求路径中。
pub struct TelegramClient {
    http: reqwest::Client,
    send_message_url: String,
    parse_mode: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifierError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| NotifierError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            http,
            send_message_url: format!(
                "{}/bot{}/sendMessage",
                config.api_base_url.trim_end_matches('/'),
                config.token
            ),
            parse_mode: config.parse_mode.clone(),
        })
    }
}

#[async_trait]
impl DeliveryClient for TelegramClient {
    async fn deliver(&self, recipient_id: &str, text: &str) -> Result<(), DeliveryError> {
        assert!(!recipient_id.is_empty(), "no chat_id provided");
        assert!(!text.is_empty(), "no message provided");

        let form = [
            ("parse_mode", self.parse_mode.as_str()),
            ("chat_id", recipient_id),
            ("text", text),
        ];

        let response = self
            .http
            .post(&self.send_message_url)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(chat_id = recipient_id, "Telegram 消息已发送");
        Ok(())
    }
}
