//! 配置管理模块
//!
//! 支持配置文件加载、环境变量覆盖、命令行参数覆盖，以及类型安全的配置访问。
//! 配置在启动时一次性解析并校验，之后以只读引用的形式传递给各组件。

use std::fmt;
use std::path::Path;

use chrono_tz::Tz;
use config::{Config, Environment, File, Map};
use serde::Deserialize;
use tracing::info;

use crate::error::NotifierError;
use crate::observability::ObservabilityConfig;

/// 未指定时使用的消费组
pub const DEFAULT_CONSUMER_GROUP: &str = "go-telegram-bot-sender";

/// 未指定时使用的时区
pub const DEFAULT_TIMEZONE: &str = "Asia/Hong_Kong";

/// Kafka 配置
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
    pub auto_offset_reset: String,
    /// 通知请求来源 topic
    pub source_topic: String,
    /// 处理结果事件写入的 topic
    pub result_topic: String,
    /// 是否使用 SASL 凭据连接
    pub with_credential: bool,
    pub username: String,
    pub password: String,
    pub security_protocol: String,
    pub sasl_mechanism: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            auto_offset_reset: "earliest".to_string(),
            source_topic: String::new(),
            result_topic: String::new(),
            with_credential: false,
            username: String::new(),
            password: String::new(),
            security_protocol: "SASL_SSL".to_string(),
            sasl_mechanism: "SCRAM-SHA-256".to_string(),
        }
    }
}

// 密码不进入日志
impl fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("brokers", &self.brokers)
            .field("consumer_group", &self.consumer_group)
            .field("auto_offset_reset", &self.auto_offset_reset)
            .field("source_topic", &self.source_topic)
            .field("result_topic", &self.result_topic)
            .field("with_credential", &self.with_credential)
            .field("username", &self.username)
            .field("password", &"***")
            .field("security_protocol", &self.security_protocol)
            .field("sasl_mechanism", &self.sasl_mechanism)
            .finish()
    }
}

/// Telegram Bot API 配置
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub api_base_url: String,
    pub parse_mode: String,
    /// 单次投递请求超时；为空时不设置超时，沿用 HTTP 客户端默认行为
    pub request_timeout_secs: Option<u64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            parse_mode: "MarkdownV2".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"***")
            .field("api_base_url", &self.api_base_url)
            .field("parse_mode", &self.parse_mode)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub kafka: KafkaConfig,
    pub telegram: TelegramConfig,
    /// IANA 时区名，用于格式化结果事件的完成时间
    pub timezone: String,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "notification-worker".to_string(),
            environment: "development".to_string(),
            kafka: KafkaConfig::default(),
            telegram: TelegramConfig::default(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// 命令行层面的覆盖项
///
/// 与具体的命令行解析库解耦，worker 将解析结果转换为该结构后交给 `AppConfig::load`。
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub tg_token: Option<String>,
    pub kafka_host: Option<String>,
    pub kafka_with_credential: Option<bool>,
    pub kafka_username: Option<String>,
    pub kafka_password: Option<String>,
    pub kafka_consumer_group: Option<String>,
    pub kafka_source_topic: Option<String>,
    pub kafka_result_topic: Option<String>,
    pub timezone: Option<String>,
    /// 为 true 时读取 X_ 前缀的扁平环境变量，并覆盖命令行参数
    pub config_with_env: bool,
}

/// 时区变量无论是否开启 config_with_env 都会读取
const TIMEZONE_ENV_KEY: &str = "X_TIMEZONE";

/// 扁平环境变量到配置键的映射
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("X_TG_TOKEN", "telegram.token"),
    ("X_KAFKA_HOST", "kafka.brokers"),
    ("X_KAFKA_WITH_CREDENTIAL", "kafka.with_credential"),
    ("X_KAFKA_USERNAME", "kafka.username"),
    ("X_KAFKA_PASSWORD", "kafka.password"),
    ("X_KAFKA_CONSUMER_GROUP", "kafka.consumer_group"),
    ("X_KAFKA_SOURCE_TOPIC", "kafka.source_topic"),
    ("X_KAFKA_RESULT_TOPIC", "kafka.result_topic"),
    ("X_TIMEZONE", "timezone"),
];

impl AppConfig {
    /// 从配置文件、环境变量和命令行覆盖项加载配置，并完成校验
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. 内置默认值
    /// 2. config/default.toml 与 config/{service_name}.toml
    /// 3. 环境变量（TGN__ 前缀，如 TGN__KAFKA__BROKERS -> kafka.brokers）
    /// 4. X_TIMEZONE
    /// 5. 命令行参数
    /// 6. 开启 config_with_env 时的 X_ 扁平环境变量
    pub fn load(service_name: &str, overrides: &ConfigOverrides) -> Result<Self, NotifierError> {
        let env = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self::load_with_env(service_name, overrides, env)
    }

    /// 与 `load` 相同，但所有环境变量都从 `env` 读取，便于测试
    pub fn load_with_env(
        service_name: &str,
        overrides: &ConfigOverrides,
        env: Map<String, String>,
    ) -> Result<Self, NotifierError> {
        let lookup = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();

        let environment = lookup("TGN_ENV").unwrap_or_else(|| "development".to_string());
        let config_dir = lookup("CONFIG_DIR").unwrap_or_else(|| "config".to_string());

        let mut builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", environment)?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("TGN")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            )
            .set_override_option("timezone", lookup(TIMEZONE_ENV_KEY))?
            .set_override_option("telegram.token", overrides.tg_token.clone())?
            .set_override_option("kafka.brokers", overrides.kafka_host.clone())?
            .set_override_option("kafka.with_credential", overrides.kafka_with_credential)?
            .set_override_option("kafka.username", overrides.kafka_username.clone())?
            .set_override_option("kafka.password", overrides.kafka_password.clone())?
            .set_override_option(
                "kafka.consumer_group",
                overrides.kafka_consumer_group.clone(),
            )?
            .set_override_option("kafka.source_topic", overrides.kafka_source_topic.clone())?
            .set_override_option("kafka.result_topic", overrides.kafka_result_topic.clone())?
            .set_override_option("timezone", overrides.timezone.clone())?;

        if overrides.config_with_env {
            for (env_key, config_key) in LEGACY_ENV_KEYS {
                let Some(value) = lookup(*env_key) else {
                    continue;
                };
                builder = if *config_key == "kafka.with_credential" {
                    builder.set_override(*config_key, value == "true")?
                } else {
                    builder.set_override(*config_key, value)?
                };
            }
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验必填项，任一缺失都视为启动期配置错误
    pub fn validate(&self) -> Result<(), NotifierError> {
        if self.telegram.token.is_empty() {
            return Err(NotifierError::missing("telegram.token"));
        }
        if self.kafka.brokers.is_empty() {
            return Err(NotifierError::missing("kafka.brokers"));
        }
        if self.kafka.consumer_group.is_empty() {
            return Err(NotifierError::missing("kafka.consumer_group"));
        }
        if self.kafka.source_topic.is_empty() {
            return Err(NotifierError::missing("kafka.source_topic"));
        }
        if self.kafka.result_topic.is_empty() {
            return Err(NotifierError::missing("kafka.result_topic"));
        }
        if self.kafka.with_credential {
            if self.kafka.username.is_empty() {
                return Err(NotifierError::missing("kafka.username"));
            }
            if self.kafka.password.is_empty() {
                return Err(NotifierError::missing("kafka.password"));
            }
        }
        self.tz()?;
        Ok(())
    }

    /// 解析配置的时区
    pub fn tz(&self) -> Result<Tz, NotifierError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| NotifierError::InvalidConfig {
                field: "timezone".to_string(),
                message: e.to_string(),
            })
    }

    /// 输出启动配置摘要（不含密码与 token）
    pub fn log_summary(&self) {
        let username = if self.kafka.with_credential {
            self.kafka.username.as_str()
        } else {
            "-"
        };
        info!(
            environment = %self.environment,
            brokers = %self.kafka.brokers,
            with_credential = self.kafka.with_credential,
            username,
            consumer_group = %self.kafka.consumer_group,
            source_topic = %self.kafka.source_topic,
            result_topic = %self.kafka.result_topic,
            timezone = %self.timezone,
            "配置加载完成"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_overrides() -> ConfigOverrides {
        ConfigOverrides {
            tg_token: Some("123:abc".to_string()),
            kafka_host: Some("localhost:9092".to_string()),
            kafka_source_topic: Some("notify.requests".to_string()),
            kafka_result_topic: Some("notify.results".to_string()),
            ..Default::default()
        }
    }

    /// 不读取任何真实环境变量，指向不存在的配置目录
    fn isolated_env(vars: &[(&str, &str)]) -> Map<String, String> {
        let mut env: Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env.entry("CONFIG_DIR".to_string())
            .or_insert_with(|| "/nonexistent/notifier-config".to_string());
        env
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.kafka.consumer_group, "go-telegram-bot-sender");
        assert_eq!(config.kafka.auto_offset_reset, "earliest");
        assert_eq!(config.telegram.api_base_url, "https://api.telegram.org");
        assert_eq!(config.telegram.parse_mode, "MarkdownV2");
        assert!(config.telegram.request_timeout_secs.is_none());
        assert_eq!(config.timezone, DEFAULT_TIMEZONE);
    }

    #[test]
    fn test_load_from_overrides() {
        let config = AppConfig::load_with_env(
            "notification-worker",
            &complete_overrides(),
            isolated_env(&[]),
        )
        .unwrap();

        assert_eq!(config.service_name, "notification-worker");
        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.kafka.brokers, "localhost:9092");
        assert_eq!(config.kafka.consumer_group, DEFAULT_CONSUMER_GROUP);
        assert_eq!(config.kafka.source_topic, "notify.requests");
        assert_eq!(config.kafka.result_topic, "notify.results");
        assert!(!config.kafka.with_credential);
    }

    #[test]
    fn test_missing_token_is_config_fault() {
        let overrides = ConfigOverrides {
            tg_token: None,
            ..complete_overrides()
        };
        let err = AppConfig::load_with_env("notification-worker", &overrides, isolated_env(&[]))
            .unwrap_err();
        assert!(matches!(err, NotifierError::InvalidConfig { .. }));
        assert!(err.to_string().contains("telegram.token"));
    }

    #[test]
    fn test_missing_result_topic_is_config_fault() {
        let overrides = ConfigOverrides {
            kafka_result_topic: None,
            ..complete_overrides()
        };
        let err = AppConfig::load_with_env("notification-worker", &overrides, isolated_env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("kafka.result_topic"));
    }

    #[test]
    fn test_credentials_required_when_enabled() {
        let overrides = ConfigOverrides {
            kafka_with_credential: Some(true),
            kafka_username: Some("svc".to_string()),
            ..complete_overrides()
        };
        let err = AppConfig::load_with_env("notification-worker", &overrides, isolated_env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("kafka.password"));

        let overrides = ConfigOverrides {
            kafka_password: Some("secret".to_string()),
            ..overrides
        };
        let config =
            AppConfig::load_with_env("notification-worker", &overrides, isolated_env(&[]))
                .unwrap();
        assert!(config.kafka.with_credential);
        assert_eq!(config.kafka.username, "svc");
    }

    #[test]
    fn test_legacy_env_ignored_without_flag() {
        let env = isolated_env(&[("X_KAFKA_HOST", "kafka.internal:9093")]);
        let config =
            AppConfig::load_with_env("notification-worker", &complete_overrides(), env).unwrap();
        assert_eq!(config.kafka.brokers, "localhost:9092");
    }

    #[test]
    fn test_legacy_env_overrides_flags() {
        let overrides = ConfigOverrides {
            config_with_env: true,
            ..complete_overrides()
        };
        let env = isolated_env(&[
            ("X_KAFKA_HOST", "kafka.internal:9093"),
            ("X_KAFKA_WITH_CREDENTIAL", "true"),
            ("X_KAFKA_USERNAME", "svc"),
            ("X_KAFKA_PASSWORD", "secret"),
            ("X_TIMEZONE", "Europe/London"),
            // 空值不覆盖
            ("X_KAFKA_SOURCE_TOPIC", ""),
        ]);
        let config = AppConfig::load_with_env("notification-worker", &overrides, env).unwrap();

        assert_eq!(config.kafka.brokers, "kafka.internal:9093");
        assert!(config.kafka.with_credential);
        assert_eq!(config.kafka.password, "secret");
        assert_eq!(config.kafka.source_topic, "notify.requests");
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::London);
    }

    #[test]
    fn test_timezone_env_read_without_flag() {
        let env = isolated_env(&[
            ("X_TIMEZONE", "Europe/London"),
            ("X_KAFKA_HOST", "kafka.internal:9093"),
        ]);
        let config =
            AppConfig::load_with_env("notification-worker", &complete_overrides(), env).unwrap();

        assert_eq!(config.timezone, "Europe/London");
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::London);
        assert_eq!(config.kafka.brokers, "localhost:9092");
    }

    #[test]
    fn test_timezone_flag_beats_timezone_env() {
        let overrides = ConfigOverrides {
            timezone: Some("Asia/Tokyo".to_string()),
            ..complete_overrides()
        };
        let env = isolated_env(&[("X_TIMEZONE", "Europe/London")]);
        let config = AppConfig::load_with_env("notification-worker", &overrides, env).unwrap();
        assert_eq!(config.timezone, "Asia/Tokyo");
    }

    #[test]
    fn test_prefixed_env_read_from_given_map() {
        let overrides = ConfigOverrides {
            kafka_host: None,
            ..complete_overrides()
        };
        let env = isolated_env(&[
            ("TGN__KAFKA__BROKERS", "kafka.env:9092"),
            ("TGN__KAFKA__CONSUMER_GROUP", "notify-staging"),
        ]);
        let config = AppConfig::load_with_env("notification-worker", &overrides, env).unwrap();

        assert_eq!(config.kafka.brokers, "kafka.env:9092");
        assert_eq!(config.kafka.consumer_group, "notify-staging");
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let overrides = ConfigOverrides {
            timezone: Some("Mars/Olympus_Mons".to_string()),
            ..complete_overrides()
        };
        let err = AppConfig::load_with_env("notification-worker", &overrides, isolated_env(&[]))
            .unwrap_err();
        assert!(matches!(err, NotifierError::InvalidConfig { .. }));
        assert!(err.to_string().contains("timezone"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.kafka.password = "hunter2".to_string();
        config.telegram.token = "123:secret-token".to_string();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-token"));
    }
}
