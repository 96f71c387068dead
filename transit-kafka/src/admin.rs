//! # Kafka 主题管理

use crate::config::KafkaConfig;
use rdkafka::{
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    metadata::Metadata,
    types::RDKafkaErrorCode,
};
use std::time::Duration;
use tracing::{debug, info, warn};
use transit::{TopicSpec, TransitError, domain::Admin};

/// 元数据中主题存在且可用
pub(crate) fn topic_listed(metadata: &Metadata, name: &str) -> bool {
    metadata
        .topics()
        .iter()
        .any(|t| t.name() == name && t.error().is_none() && !t.partitions().is_empty())
}

/// 主题分区编号
pub(crate) fn partitions_of(metadata: &Metadata, name: &str) -> Vec<i32> {
    metadata
        .topics()
        .iter()
        .find(|t| t.name() == name)
        .map(|t| t.partitions().iter().map(|p| p.id()).collect())
        .unwrap_or_default()
}

/// Kafka 主题管理客户端
pub struct KafkaAdmin {
    client: AdminClient<DefaultClientContext>,
    opts: AdminOptions,
    timeout: Duration,
}

impl KafkaAdmin {
    /// 构造函数
    pub fn new(cfg: &KafkaConfig) -> Result<Self, TransitError> {
        let client = cfg
            .admin_config()
            .create()
            .map_err(|e| TransitError::Metadata(e.to_string()))?;
        let opts = AdminOptions::new()
            .operation_timeout(Some(cfg.timeout))
            .request_timeout(Some(cfg.timeout));
        info!(bootstrap = %cfg.bootstrap, "创建管理客户端");
        Ok(Self {
            client,
            opts,
            timeout: cfg.timeout,
        })
    }

    /// 删除主题
    pub async fn delete_topic(&self, name: &str) -> Result<(), TransitError> {
        self.client
            .delete_topics(&[name], &self.opts)
            .await
            .map_err(|e| TransitError::Metadata(e.to_string()))?;
        Ok(())
    }
}

impl Admin for KafkaAdmin {
    async fn topic_exists(&self, name: &str) -> Result<bool, TransitError> {
        let metadata = self
            .client
            .inner()
            .fetch_metadata(Some(name), self.timeout)
            .map_err(|e| TransitError::Metadata(e.to_string()))?;
        let exists = topic_listed(&metadata, name);
        debug!(topic = name, exists, "查询主题元数据");
        Ok(exists)
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), TransitError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replicas),
        );
        let provision = |reason: String| TransitError::Provision {
            topic: spec.name.clone(),
            reason,
        };
        let results = self
            .client
            .create_topics(&[topic], &self.opts)
            .await
            .map_err(|e| provision(e.to_string()))?;
        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "成功创建主题"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    warn!(topic = %name, "主题已由其他进程创建")
                }
                Err((_, code)) => return Err(provision(code.to_string())),
            }
        }
        Ok(())
    }
}
