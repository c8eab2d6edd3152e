//! 结果事件发布
//!
//! 将结果事件序列化为 JSON 写入结果 topic，并附带协议版本与来源坐标消息头。

use async_trait::async_trait;
use notifier_shared::error::NotifierError;
use notifier_shared::kafka::KafkaProducer;

use crate::outcome::{OutcomeEvent, PROTOCOL_VERSION, SOURCE_HEADER, VERSION_HEADER};

/// 结果事件发布接口
#[async_trait]
pub trait OutcomePublisher: Send + Sync {
    async fn publish(&self, event: &OutcomeEvent) -> Result<(), NotifierError>;
}

/// 写入结果 topic 的一条 Kafka 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub topic: String,
    /// 来源坐标，同时作为消息 key 和 `source` 消息头
    pub source: String,
    /// camelCase JSON 形式的结果事件
    pub payload: Vec<u8>,
}

impl OutcomeRecord {
    /// 由结果事件构建记录，只做序列化不做 I/O
    pub fn build(result_topic: &str, event: &OutcomeEvent) -> Result<Self, NotifierError> {
        Ok(Self {
            topic: result_topic.to_string(),
            source: event.source().source_header(),
            payload: serde_json::to_vec(event)?,
        })
    }

    pub fn headers(&self) -> [(&'static str, &str); 2] {
        [
            (VERSION_HEADER, PROTOCOL_VERSION),
            (SOURCE_HEADER, self.source.as_str()),
        ]
    }
}

/// 基于 Kafka 的结果事件发布器
pub struct KafkaOutcomePublisher {
    producer: KafkaProducer,
    result_topic: String,
}

impl KafkaOutcomePublisher {
    pub fn new(producer: KafkaProducer, result_topic: impl Into<String>) -> Self {
        Self {
            producer,
            result_topic: result_topic.into(),
        }
    }
}

#[async_trait]
impl OutcomePublisher for KafkaOutcomePublisher {
    async fn publish(&self, event: &OutcomeEvent) -> Result<(), NotifierError> {
        let record = OutcomeRecord::build(&self.result_topic, event)?;

        // 以来源坐标作为消息 key，同一来源记录的结果落在同一分区
        self.producer
            .send(&record.topic, &record.source, &record.payload, &record.headers())
            .await?;
        Ok(())
    }
}
