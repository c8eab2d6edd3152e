//! 通知管道端到端流程测试
//!
//! 使用真实的 `TelegramClient` 对接本地假 Bot API，验证每条记录的结果事件。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use notification_worker::delivery::TelegramClient;
use notification_worker::outcome::OutcomeEvent;
use notification_worker::pipeline::NotificationPipeline;
use notification_worker::publisher::OutcomePublisher;
use notifier_shared::config::TelegramConfig;
use notifier_shared::error::NotifierError;
use notifier_shared::kafka::ConsumerMessage;
use tokio::net::TcpListener;

const TOKEN: &str = "flow-token";
const SOURCE_TOPIC: &str = "notify.requests";
/// 假 Bot API 对该 chat_id 返回 403
const BLOCKED_CHAT: &str = "400";

type Sent = Arc<Mutex<Vec<HashMap<String, String>>>>;

#[derive(Default)]
struct CollectingPublisher {
    events: Mutex<Vec<OutcomeEvent>>,
}

#[async_trait]
impl OutcomePublisher for CollectingPublisher {
    async fn publish(&self, event: &OutcomeEvent) -> Result<(), NotifierError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

async fn send_message(
    Path(bot): Path<String>,
    State(sent): State<Sent>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    if bot != format!("bot{TOKEN}") {
        return (StatusCode::UNAUTHORIZED, r#"{"ok":false,"error_code":401}"#);
    }
    if form.get("chat_id").map(String::as_str) == Some(BLOCKED_CHAT) {
        return (
            StatusCode::FORBIDDEN,
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        );
    }
    sent.lock().unwrap().push(form);
    (StatusCode::OK, r#"{"ok":true}"#)
}

async fn start_bot_api() -> (String, Sent) {
    let sent: Sent = Arc::default();
    let app = Router::new()
        .route("/{bot}/sendMessage", post(send_message))
        .with_state(sent.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), sent)
}

async fn setup() -> (NotificationPipeline, Arc<CollectingPublisher>, Sent) {
    let (base_url, sent) = start_bot_api().await;
    let client = TelegramClient::new(&TelegramConfig {
        token: TOKEN.to_string(),
        api_base_url: base_url,
        request_timeout_secs: Some(5),
        ..Default::default()
    })
    .unwrap();

    let publisher = Arc::new(CollectingPublisher::default());
    let pipeline = NotificationPipeline::new(
        Arc::new(client),
        publisher.clone(),
        SOURCE_TOPIC,
        chrono_tz::Asia::Hong_Kong,
    );
    (pipeline, publisher, sent)
}

fn record(offset: i64, payload: &str) -> ConsumerMessage {
    ConsumerMessage {
        topic: SOURCE_TOPIC.to_string(),
        partition: 2,
        offset,
        key: None,
        payload: payload.as_bytes().to_vec(),
        timestamp: None,
        headers: HashMap::new(),
    }
}

#[tokio::test]
async fn test_plain_and_base64_records_are_delivered() {
    let (pipeline, publisher, sent) = setup().await;

    let plain = record(10, r#"{"receiver":123,"encoding":"none","message":"hello"}"#);
    let encoded = format!(
        r#"{{"receiver":456,"encoding":"base64","message":"{}"}}"#,
        BASE64.encode("*bold* notice")
    );
    let encoded = record(11, &encoded);

    let first = pipeline.handle(Ok(plain)).await;
    let second = pipeline.handle(Ok(encoded)).await;

    assert!(first.result, "unexpected error: {}", first.err);
    assert!(second.result, "unexpected error: {}", second.err);
    assert_eq!(first.err, "");
    assert!(first.complete_time.ends_with("+08:00"));
    assert!(first.processing_period >= 0);

    let forms = sent.lock().unwrap();
    assert_eq!(forms.len(), 2);
    assert_eq!(forms[0]["chat_id"], "123");
    assert_eq!(forms[0]["text"], "hello");
    assert_eq!(forms[0]["parse_mode"], "MarkdownV2");
    assert_eq!(forms[1]["chat_id"], "456");
    assert_eq!(forms[1]["text"], "*bold* notice");

    let events = publisher.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        (events[0].topic.as_str(), events[0].partition, events[0].offset),
        (SOURCE_TOPIC, 2, 10)
    );
    assert_eq!(events[1].offset, 11);
}

#[tokio::test]
async fn test_rejected_delivery_reports_status_and_body() {
    let (pipeline, publisher, sent) = setup().await;

    let msg = record(
        20,
        &format!(r#"{{"receiver":{BLOCKED_CHAT},"encoding":"none","message":"hi"}}"#),
    );
    let event = pipeline.process_one(&msg).await;

    assert!(!event.result);
    assert!(event.err.contains("403"));
    assert!(event.err.contains("bot was blocked by the user"));
    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(publisher.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsupported_encoding_never_reaches_bot_api() {
    let (pipeline, publisher, sent) = setup().await;

    let msg = record(30, r#"{"receiver":123,"encoding":"rot13","message":"uryyb"}"#);
    let event = pipeline.process_one(&msg).await;

    assert!(!event.result);
    assert_eq!(event.err, "Encoding[rot13] not supported");
    assert!(sent.lock().unwrap().is_empty());

    let events = publisher.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].offset, 30);
}

#[tokio::test]
async fn test_read_failure_publishes_event_and_processing_continues() {
    let (pipeline, publisher, sent) = setup().await;

    let failed = pipeline
        .handle(Err(NotifierError::Kafka("Broker transport failure".to_string())))
        .await;
    let next = pipeline
        .handle(Ok(record(
            41,
            r#"{"receiver":7,"encoding":"none","message":"after failure"}"#,
        )))
        .await;

    assert!(!failed.result);
    assert_eq!(failed.topic, SOURCE_TOPIC);
    assert_eq!((failed.partition, failed.offset), (-1, -1));
    assert!(failed.err.contains("Broker transport failure"));
    assert!(next.result);

    assert_eq!(sent.lock().unwrap().len(), 1);
    assert_eq!(publisher.events.lock().unwrap().len(), 2);
}
