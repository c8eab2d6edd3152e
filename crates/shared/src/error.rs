//! 统一错误处理模块
//!
//! 定义基础设施层（配置、Kafka、序列化）共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 单条消息的处理失败不在这里建模，由 worker 侧的记录级错误承载。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum NotifierError {
    // ==================== 配置错误 ====================
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("配置项无效: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 序列化错误 ====================
    #[error("序列化失败: {0}")]
    Serialization(String),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

impl NotifierError {
    /// 缺失必填配置项时的便捷构造
    pub fn missing(field: &str) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            message: "不能为空".to_string(),
        }
    }
}

impl From<serde_json::Error> for NotifierError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
