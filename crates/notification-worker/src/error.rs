//! 通知处理错误类型
//!
//! 记录级错误会原样写入结果事件的 `err` 字段，供下游系统读取，
//! 因此错误文本保持稳定的英文格式，并带上定位问题所需的原始值。

use thiserror::Error;

/// 投递到 Bot API 失败
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// 服务端返回了非 200 状态码
    #[error("request error, code: {status}\n{body}")]
    Rejected { status: u16, body: String },

    /// 连接、超时、读取响应体等网络层失败
    #[error("request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// 单条记录的处理失败
///
/// 任一阶段出错即终止该记录的后续阶段，错误随结果事件上报，消费循环继续。
#[derive(Debug, Error)]
pub enum RecordError {
    /// 从队列读取记录失败
    #[error("read failed: {0}")]
    Read(String),

    /// 负载不是合法的通知请求 JSON
    #[error("invalid notification payload: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Encoding[{0}] not supported")]
    UnsupportedEncoding(String),

    #[error("invalid base64 message body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("decoded message body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// 解码后消息正文为空，Bot API 不接受空消息
    #[error("message body is empty")]
    EmptyMessage,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl RecordError {
    /// 错误所在的处理阶段，用于日志和指标
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Deserialization(_) => "parse",
            Self::UnsupportedEncoding(_)
            | Self::InvalidBase64(_)
            | Self::InvalidUtf8(_)
            | Self::EmptyMessage => "decode",
            Self::Delivery(_) => "deliver",
        }
    }
}
