//! 通知工作者服务
//!
//! 从 Kafka 消费通知请求，解码后经 Telegram Bot API 投递，
//! 并为每条消费到的记录向结果 topic 发布一条处理结果事件。
//! 记录逐条处理，单条失败只体现在结果事件中，不影响后续记录。

pub mod cli;
pub mod delivery;
pub mod error;
pub mod message;
pub mod outcome;
pub mod pipeline;
pub mod publisher;
