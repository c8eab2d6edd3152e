//! 通知消息管道
//!
//! 每条记录依次经过 解析 -> 解码 -> 投递 三个阶段，任一阶段失败即短路，
//! 但无论成功与否都会生成并发布恰好一条结果事件。记录逐条处理，不做重试。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use notifier_shared::config::AppConfig;
use notifier_shared::error::NotifierError;
use notifier_shared::kafka::{ConsumerMessage, KafkaConsumer};
use notifier_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::delivery::DeliveryClient;
use crate::error::RecordError;
use crate::message::InboundMessage;
use crate::outcome::{OutcomeEvent, RecordSource};
use crate::publisher::OutcomePublisher;

/// 通知消息管道
///
/// 组合投递客户端和结果发布器，二者都以 trait 对象注入，便于测试替换。
pub struct NotificationPipeline {
    delivery: Arc<dyn DeliveryClient>,
    publisher: Arc<dyn OutcomePublisher>,
    source_topic: String,
    timezone: Tz,
}

impl NotificationPipeline {
    pub fn new(
        delivery: Arc<dyn DeliveryClient>,
        publisher: Arc<dyn OutcomePublisher>,
        source_topic: impl Into<String>,
        timezone: Tz,
    ) -> Self {
        Self {
            delivery,
            publisher,
            source_topic: source_topic.into(),
            timezone,
        }
    }

    /// 从已校验的配置构建
    pub fn from_config(
        config: &AppConfig,
        delivery: Arc<dyn DeliveryClient>,
        publisher: Arc<dyn OutcomePublisher>,
    ) -> Result<Self, NotifierError> {
        Ok(Self::new(
            delivery,
            publisher,
            config.kafka.source_topic.clone(),
            config.tz()?,
        ))
    }

    pub fn source_topic(&self) -> &str {
        &self.source_topic
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone)
    }

    /// 对一条记录执行 解析 -> 解码 -> 投递，返回第一个失败阶段的错误
    pub async fn attempt(&self, msg: &ConsumerMessage) -> Result<(), RecordError> {
        let request = InboundMessage::from_payload(&msg.payload)?.decode()?;

        self.delivery
            .deliver(&request.receiver_id(), &request.message)
            .await?;
        Ok(())
    }

    /// 处理一条记录并发布结果事件
    ///
    /// 计时从拿到记录后开始，不包含阻塞读取的等待时间。
    pub async fn process_one(&self, msg: &ConsumerMessage) -> OutcomeEvent {
        let started = Instant::now();
        let outcome = self.attempt(msg).await;

        let event = OutcomeEvent::new(&RecordSource::from(msg), Some(started), self.now(), &outcome);

        metrics::record_notification(event.result, started.elapsed().as_secs_f64());
        match &outcome {
            Ok(()) => info!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                processing_ms = event.processing_period,
                "通知已投递"
            ),
            Err(e) => warn!(
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                stage = e.stage(),
                error = %e,
                "通知处理失败"
            ),
        }

        self.report(&event).await;
        event
    }

    /// 读取记录失败时同样发布一条失败事件，坐标只保留订阅的 topic
    pub async fn process_read_failure(&self, err: &NotifierError) -> OutcomeEvent {
        let outcome = Err(RecordError::Read(err.to_string()));
        let event = OutcomeEvent::new(
            &RecordSource::unknown(&self.source_topic),
            None,
            self.now(),
            &outcome,
        );

        metrics::record_read_failure();
        error!(topic = %self.source_topic, error = %err, "读取 Kafka 记录失败");

        self.report(&event).await;
        event
    }

    /// 处理消费循环交来的一项：记录或读取错误
    pub async fn handle(&self, item: Result<ConsumerMessage, NotifierError>) -> OutcomeEvent {
        match item {
            Ok(msg) => self.process_one(&msg).await,
            Err(e) => self.process_read_failure(&e).await,
        }
    }

    /// 发布结果事件；失败只记录错误日志，不影响后续记录
    async fn report(&self, event: &OutcomeEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            metrics::record_publish_failure();
            error!(
                source = %event.source().source_header(),
                result = event.result,
                error = %e,
                "发布结果事件失败"
            );
        }
    }

    /// 订阅来源 topic 并逐条处理，直到收到 shutdown 信号
    pub async fn run(
        self,
        consumer: KafkaConsumer,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), NotifierError> {
        consumer.subscribe(&[self.source_topic.as_str()])?;

        info!(topic = %self.source_topic, "通知消费者已启动");

        let pipeline = &self;
        consumer
            .start(shutdown, |item| async move {
                pipeline.handle(item).await;
            })
            .await;

        info!("通知消费者已停止");
        Ok(())
    }
}
