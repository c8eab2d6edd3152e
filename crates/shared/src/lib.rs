//! 共享库
//!
//! 包含通知工作者使用的配置加载、错误类型、Kafka 读写封装和可观测性初始化等基础设施代码。

pub mod config;
pub mod error;
pub mod kafka;
pub mod observability;
