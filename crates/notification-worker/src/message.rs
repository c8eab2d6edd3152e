//! 通知请求消息模型与解码
//!
//! 来源 topic 中每条记录的负载是一条 JSON 通知请求，
//! 正文可以是明文（`none`）或 base64 编码（`base64`）。

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// 正文编码方式
///
/// 未知取值保留为 `Other`，让 JSON 解析成功、由解码阶段给出明确的"不支持的编码"错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Encoding {
    None,
    Base64,
    Other(String),
}

impl From<String> for Encoding {
    fn from(value: String) -> Self {
        match value.as_str() {
            "none" => Self::None,
            "base64" => Self::Base64,
            _ => Self::Other(value),
        }
    }
}

impl From<Encoding> for String {
    fn from(value: Encoding) -> Self {
        match value {
            Encoding::None => "none".to_string(),
            Encoding::Base64 => "base64".to_string(),
            Encoding::Other(other) => other,
        }
    }
}

/// 通知请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Telegram chat id
    pub receiver: i64,
    pub encoding: Encoding,
    pub message: String,
}

impl InboundMessage {
    /// 从记录负载解析通知请求
    pub fn from_payload(payload: &[u8]) -> Result<Self, RecordError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// 接收方 chat id 的十进制字符串形式
    pub fn receiver_id(&self) -> String {
        self.receiver.to_string()
    }

    /// 按声明的编码解码正文，返回 `encoding = none` 的消息
    ///
    /// base64 正文必须解码为合法 UTF-8。解码之后还有一步校验：正文为空时
    /// 返回 `EmptyMessage`，`none` 编码也不例外，因此对空正文并非原样返回。
    /// 这一步保证交给投递客户端的文本永远非空。
    pub fn decode(self) -> Result<Self, RecordError> {
        let Self {
            receiver,
            encoding,
            message,
        } = self;

        let message = match encoding {
            Encoding::None => message,
            Encoding::Base64 => String::from_utf8(BASE64.decode(message.as_bytes())?)?,
            Encoding::Other(name) => return Err(RecordError::UnsupportedEncoding(name)),
        };

        if message.is_empty() {
            return Err(RecordError::EmptyMessage);
        }
        Ok(Self {
            receiver,
            encoding: Encoding::None,
            message,
        })
    }
}
