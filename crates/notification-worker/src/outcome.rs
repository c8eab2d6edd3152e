//! 处理结果事件
//!
//! 每条消费到的记录（无论成功与否）都对应一条结果事件，写入结果 topic。

use std::time::Instant;

use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use notifier_shared::kafka::ConsumerMessage;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// 结果事件协议版本，随 `version` 消息头发送
pub const PROTOCOL_VERSION: &str = "1.0.0";

pub const VERSION_HEADER: &str = "version";
pub const SOURCE_HEADER: &str = "source";

/// 读取失败时没有分区和位点可用，使用 librdkafka 的无效值
const UNKNOWN_PARTITION: i32 = -1;
const UNKNOWN_OFFSET: i64 = -1;

/// 来源记录坐标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSource {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl RecordSource {
    /// 读取失败时只知道订阅的 topic
    pub fn unknown(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            partition: UNKNOWN_PARTITION,
            offset: UNKNOWN_OFFSET,
        }
    }

    /// `source` 消息头取值：`<topic>/<partition>/<offset>`
    pub fn source_header(&self) -> String {
        format!("{}/{}/{}", self.topic, self.partition, self.offset)
    }
}

impl From<&ConsumerMessage> for RecordSource {
    fn from(msg: &ConsumerMessage) -> Self {
        Self {
            topic: msg.topic.clone(),
            partition: msg.partition,
            offset: msg.offset,
        }
    }
}

/// 处理结果事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// RFC 3339，秒级精度，使用配置的时区
    pub complete_time: String,
    /// 毫秒
    pub processing_period: i64,
    pub result: bool,
    /// 成功时为空字符串
    pub err: String,
}

impl OutcomeEvent {
    /// 根据一次处理尝试构建结果事件
    ///
    /// `started` 为空表示计时尚未开始（如读取失败），此时处理时长为 0。
    pub fn new(
        source: &RecordSource,
        started: Option<Instant>,
        completed_at: DateTime<Tz>,
        outcome: &Result<(), RecordError>,
    ) -> Self {
        let processing_period = started
            .map(|s| i64::try_from(s.elapsed().as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);

        let (result, err) = match outcome {
            Ok(()) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        };

        Self {
            topic: source.topic.clone(),
            partition: source.partition,
            offset: source.offset,
            complete_time: completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            processing_period,
            result,
            err,
        }
    }

    pub fn source(&self) -> RecordSource {
        RecordSource {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}
