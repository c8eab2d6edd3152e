//! 命令行参数定义
//!
//! 所有参数都是可选的：缺省时由配置文件或环境变量提供，最终由 `AppConfig::validate` 统一校验。

use clap::Parser;
use notifier_shared::config::ConfigOverrides;

/// Telegram 通知工作者
#[derive(Parser, Debug, Default)]
#[command(name = "notification-worker")]
#[command(version, about = "消费 Kafka 通知请求并通过 Telegram Bot 投递")]
pub struct Cli {
    /// 用于发送通知的 Bot token
    #[arg(long)]
    pub tg_token: Option<String>,

    /// Kafka broker 地址
    #[arg(long)]
    pub kafka_host: Option<String>,

    /// Kafka 连接是否使用 SASL 凭据
    #[arg(long)]
    pub kafka_with_credential: bool,

    /// Kafka SASL 用户名
    #[arg(long)]
    pub kafka_username: Option<String>,

    /// Kafka SASL 密码
    #[arg(long)]
    pub kafka_password: Option<String>,

    /// 消费组 id
    #[arg(long)]
    pub kafka_consumer_group: Option<String>,

    /// 通知请求来源 topic
    #[arg(long)]
    pub kafka_source_topic: Option<String>,

    /// 处理结果事件写入的 topic
    #[arg(long)]
    pub kafka_result_topic: Option<String>,

    /// 结果事件完成时间使用的 IANA 时区
    #[arg(long)]
    pub timezone: Option<String>,

    /// 从 X_ 前缀的环境变量读取配置
    #[arg(long)]
    pub config_with_env: bool,
}

impl Cli {
    /// 转换为配置层的覆盖项；未出现的开关不覆盖配置文件中的值
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            tg_token: self.tg_token.clone(),
            kafka_host: self.kafka_host.clone(),
            kafka_with_credential: self.kafka_with_credential.then_some(true),
            kafka_username: self.kafka_username.clone(),
            kafka_password: self.kafka_password.clone(),
            kafka_consumer_group: self.kafka_consumer_group.clone(),
            kafka_source_topic: self.kafka_source_topic.clone(),
            kafka_result_topic: self.kafka_result_topic.clone(),
            timezone: self.timezone.clone(),
            config_with_env: self.config_with_env,
        }
    }
}
