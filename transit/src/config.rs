//! # 配置构建
//!
//! 依次叠加 `{root}/default`、`{root}/{TRANSIT_ENV}` 与 `TRANSIT__` 前缀的环境变量。

use crate::{assign::OffsetPolicy, drain::DrainConfig, errors::ConfigError};
use config::{Config, Environment, File};
use serde::{Deserialize, de::DeserializeOwned};
use std::{collections::HashMap, num::NonZeroUsize, path::PathBuf, time::Duration};
use validator::Validate;

/// 命名配置集合，缺失的名称取默认值
#[derive(Debug, Clone, Default)]
pub struct NamedConfig<T> {
    configs: HashMap<String, T>,
}

impl<T> NamedConfig<T>
where
    T: Clone + Default,
{
    /// 按名称获取配置
    pub fn get(&self, name: &str) -> T {
        self.configs.get(name).cloned().unwrap_or_default()
    }

    /// 是否显式配置了该名称
    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }
}

/// 构建分层配置
pub fn build_config(crate_dir: PathBuf) -> Result<Config, ConfigError> {
    let config_root = std::env::var("TRANSIT_CONFIG_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| crate_dir.join("config"));
    let env = std::env::var("TRANSIT_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::builder()
        .add_source(File::from(config_root.join("default")).required(false))
        .add_source(File::from(config_root.join(env)).required(false))
        .add_source(
            Environment::with_prefix("TRANSIT")
                .separator("__")
                .list_separator(","),
        )
        .build()?;
    Ok(config)
}

/// 加载并验证命名配置节，配置节缺失时为空集合
pub fn load_named_config<T>(config: &Config, section: &str) -> Result<NamedConfig<T>, ConfigError>
where
    T: DeserializeOwned + Validate + Clone + Default,
{
    let configs = match config.get::<HashMap<String, T>>(section) {
        Ok(c) => c,
        Err(config::ConfigError::NotFound(_)) => HashMap::new(),
        Err(e) => return Err(e.into()),
    };

    for (key, cfg) in &configs {
        cfg.validate().map_err(|e| ConfigError::ValidationError {
            section: section.to_string(),
            key: key.to_string(),
            message: e.to_string(),
        })?;
    }

    Ok(NamedConfig { configs })
}

/// 主题配置
#[derive(Debug, Deserialize, Validate, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TopicConfig {
    /// 分区数
    #[validate(range(min = 1))]
    pub partitions: i32,
    /// 副本数
    #[validate(range(min = 1))]
    pub replicas: i32,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            partitions: 1,
            replicas: 1,
        }
    }
}

/// 消费者配置
#[derive(Debug, Deserialize, Validate, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ConsumerConfig {
    /// 客户端 Id
    #[validate(length(min = 1))]
    pub client_id: String,
    /// 消费组 Id
    #[validate(length(min = 1))]
    pub group_id: String,
    /// 指派时是否从最早偏移开始
    pub offset_earliest: bool,
    /// 消息体是否为 Avro 编码
    pub is_avro: bool,
    /// 空闲休眠毫秒数
    #[validate(range(min = 1))]
    pub sleep_ms: u64,
    /// 单次轮询超时毫秒数
    #[validate(range(min = 1))]
    pub consume_timeout_ms: u64,
    /// 连续投递多少条后让出调度，0 表示不让出
    pub yield_every: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            client_id: "sim-consumer".to_string(),
            group_id: "sim-consumer".to_string(),
            offset_earliest: false,
            is_avro: true,
            sleep_ms: 1000,
            consume_timeout_ms: 100,
            yield_every: 0,
        }
    }
}

impl ConsumerConfig {
    /// 起始偏移策略
    pub fn offset_policy(&self) -> OffsetPolicy {
        OffsetPolicy::from(self.offset_earliest)
    }

    /// 转换为排空循环参数
    pub fn to_drain_config(&self) -> DrainConfig {
        DrainConfig {
            poll_timeout: Duration::from_millis(self.consume_timeout_ms),
            sleep: Duration::from_millis(self.sleep_ms),
            yield_every: NonZeroUsize::new(self.yield_every),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(text: &str) -> Config {
        Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn named_consumers_fall_back_to_defaults() {
        let config = from_toml(
            r#"
            [consumers.arrivals]
            offset_earliest = true
            yield_every = 64

            [consumers.turnstile]
            group_id = "turnstile-consumer"
            is_avro = false
            "#,
        );

        let consumers = load_named_config::<ConsumerConfig>(&config, "consumers").unwrap();
        let arrivals = consumers.get("arrivals");
        let turnstile = consumers.get("turnstile");
        let weather = consumers.get("weather");

        assert_eq!(arrivals.offset_policy(), OffsetPolicy::Earliest);
        assert_eq!(arrivals.client_id, "sim-consumer");
        assert_eq!(
            arrivals.to_drain_config(),
            DrainConfig {
                poll_timeout: Duration::from_millis(100),
                sleep: Duration::from_secs(1),
                yield_every: NonZeroUsize::new(64),
            }
        );
        assert_eq!(turnstile.group_id, "turnstile-consumer");
        assert!(!turnstile.is_avro);
        assert!(!consumers.contains("weather"));
        assert_eq!(weather, ConsumerConfig::default());
        assert_eq!(weather.to_drain_config().yield_every, None);
    }

    #[test]
    fn invalid_topic_is_rejected() {
        let config = from_toml(
            r#"
            [topics.turnstile]
            partitions = 0
            "#,
        );

        let err = load_named_config::<TopicConfig>(&config, "topics").unwrap_err();

        assert!(matches!(
            err,
            ConfigError::ValidationError { ref section, ref key, .. }
                if section == "topics" && key == "turnstile"
        ));
    }

    #[test]
    fn missing_section_is_empty() {
        let config = from_toml("bootstrap = \"localhost:9092\"");

        let topics = load_named_config::<TopicConfig>(&config, "topics").unwrap();

        assert!(!topics.contains("weather"));
        assert_eq!(topics.get("weather"), TopicConfig::default());
    }
}
