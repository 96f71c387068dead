//! # Kafka 配置
//!
//! 配置在首次获取时加载并缓存，`reload` 重新读取配置源。

use rdkafka::ClientConfig;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{OnceLock, RwLock},
    time::Duration,
};
use tracing::info;
use transit::{
    ConfigError, TopicSpec,
    config::{ConsumerConfig, NamedConfig, TopicConfig, build_config, load_named_config},
    domain,
};

static KAFKA_CONFIG: OnceLock<RwLock<KafkaConfig>> = OnceLock::new();

fn get_or<T>(config: &config::Config, key: &str, default: T) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    match config.get::<T>(key) {
        Ok(v) => Ok(v),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e.into()),
    }
}

/// 从配置源构建 Kafka 配置
pub fn load_kafka(config: &config::Config) -> Result<KafkaConfig, ConfigError> {
    let bootstrap = get_or(config, "bootstrap", "PLAINTEXT://localhost:9092".to_string())?;
    let schema_registry = get_or(
        config,
        "schema_registry",
        "http://localhost:8081".to_string(),
    )?;
    let ksql_url = get_or(config, "ksql_url", "http://localhost:8088".to_string())?;
    let client_id = get_or(config, "client_id", "sim-producer".to_string())?;
    let timeout = Duration::from_secs(get_or(config, "timeout", 5)?);
    let flush_timeout = Duration::from_secs(get_or(config, "flush_timeout", 30)?);
    let topics = load_named_config(config, "topics")?;
    let consumers = load_named_config(config, "consumers")?;
    let cp = get_or(config, "cp", HashMap::new())?;
    let cc = get_or(config, "cc", HashMap::new())?;
    Ok(KafkaConfig {
        bootstrap,
        schema_registry,
        ksql_url,
        client_id,
        timeout,
        flush_timeout,
        topics,
        consumers,
        cp,
        cc,
    })
}

fn load() -> Result<KafkaConfig, ConfigError> {
    let config = build_config(PathBuf::from(env!("CARGO_MANIFEST_DIR")))?;
    load_kafka(&config)
}

/// Kafka 配置结构
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// broker 地址
    pub bootstrap: String,
    /// 模式注册中心地址
    pub schema_registry: String,
    /// 查询引擎地址
    pub ksql_url: String,
    /// 生产者客户端 Id
    pub client_id: String,
    /// 元数据与管理请求超时
    pub timeout: Duration,
    /// 关闭时刷新缓冲的超时
    pub flush_timeout: Duration,
    /// 主题配置，按逻辑名称索引
    pub topics: NamedConfig<TopicConfig>,
    /// 消费者配置，按逻辑名称索引
    pub consumers: NamedConfig<ConsumerConfig>,
    /// 额外的生产者设置
    pub cp: HashMap<String, String>,
    /// 额外的消费者设置
    pub cc: HashMap<String, String>,
}

impl KafkaConfig {
    /// 按逻辑名称生成主题规格
    pub fn topic_spec(&self, name: &str, topic: &str) -> TopicSpec {
        let cfg = self.topics.get(name);
        TopicSpec::new(topic, cfg.partitions, cfg.replicas)
    }

    /// 管理客户端设置
    pub fn admin_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap)
            .set("allow.auto.create.topics", "false");
        config
    }

    /// 生产者设置
    pub fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in &self.cp {
            config.set(key, value);
        }
        config
            .set("bootstrap.servers", &self.bootstrap)
            .set("client.id", &self.client_id);
        config
    }

    /// 消费者设置
    pub fn consumer_config(&self, consumer: &ConsumerConfig) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in &self.cc {
            config.set(key, value);
        }
        config
            .set("bootstrap.servers", &self.bootstrap)
            .set("client.id", &consumer.client_id)
            .set("group.id", &consumer.group_id)
            .set("allow.auto.create.topics", "false");
        config
    }
}

impl domain::Config for KafkaConfig {
    fn get() -> Result<Self, ConfigError> {
        let cell = match KAFKA_CONFIG.get() {
            Some(c) => c,
            None => {
                let cfg = load()?;
                info!(bootstrap = %cfg.bootstrap, "加载 Kafka 配置");
                KAFKA_CONFIG.get_or_init(|| RwLock::new(cfg))
            }
        };
        cell.read()
            .map(|cfg| cfg.clone())
            .map_err(|e| ConfigError::Poisoned(e.to_string()))
    }

    fn reload() -> Result<(), ConfigError> {
        let cfg = load()?;
        match KAFKA_CONFIG.get() {
            Some(cell) => {
                let mut guard = cell
                    .write()
                    .map_err(|e| ConfigError::Poisoned(e.to_string()))?;
                *guard = cfg;
            }
            None => {
                KAFKA_CONFIG.get_or_init(|| RwLock::new(cfg));
            }
        }
        info!("重新加载 Kafka 配置");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn defaults_when_sources_are_empty() {
        let config = config::Config::builder().build().unwrap();

        let cfg = load_kafka(&config).unwrap();

        assert_eq!(cfg.bootstrap, "PLAINTEXT://localhost:9092");
        assert_eq!(cfg.schema_registry, "http://localhost:8081");
        assert_eq!(cfg.client_id, "sim-producer");
        assert_eq!(cfg.flush_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.topic_spec("turnstile", "org.chicago.cta.turnstile"),
            TopicSpec::new("org.chicago.cta.turnstile", 1, 1)
        );
    }

    #[test]
    fn consumer_settings_carry_group_identity() {
        let config = config::Config::builder()
            .add_source(File::from_str(
                r#"
                bootstrap = "localhost:19092"

                [cc]
                "session.timeout.ms" = "10000"

                [consumers.stations]
                client_id = "stations-stream"
                group_id = "stations-stream"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg = load_kafka(&config).unwrap();

        let client = cfg.consumer_config(&cfg.consumers.get("stations"));

        assert_eq!(client.get("bootstrap.servers"), Some("localhost:19092"));
        assert_eq!(client.get("group.id"), Some("stations-stream"));
        assert_eq!(client.get("session.timeout.ms"), Some("10000"));
        assert_eq!(client.get("allow.auto.create.topics"), Some("false"));
    }
}
