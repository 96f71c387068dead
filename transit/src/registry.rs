//! # 主题登记
//!
//! 同一进程内每个主题名称只尝试创建一次，所有发布者共享同一个登记表。

use crate::{domain::Admin, errors::TransitError, record::TopicSpec};
use ahash::AHashSet;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// 主题登记表
#[derive(Debug, Default)]
pub struct TopicRegistry {
    attempted: Mutex<AHashSet<String>>,
}

impl TopicRegistry {
    /// 构造函数
    pub fn new() -> Self {
        Self::default()
    }

    /// 确保主题存在
    ///
    /// 检查与创建在锁内完成，并发调用同一主题只会发出一次创建请求。
    /// 创建失败时仍登记该主题，错误返回给调用方。
    #[instrument(name = "ensure_topic", skip_all, fields(topic = %spec.name))]
    pub async fn ensure<A: Admin>(&self, admin: &A, spec: &TopicSpec) -> Result<(), TransitError> {
        let mut attempted = self.attempted.lock().await;
        if attempted.contains(&spec.name) {
            debug!("主题已登记，跳过");
            return Ok(());
        }

        let result = match admin.topic_exists(&spec.name).await {
            Ok(true) => {
                debug!("主题已存在");
                Ok(())
            }
            Ok(false) => {
                info!(
                    partitions = spec.partitions,
                    replicas = spec.replicas,
                    "开始创建主题"
                );
                admin.create_topic(spec).await
            }
            Err(e) => Err(e),
        };
        attempted.insert(spec.name.clone());

        if let Err(e) = &result {
            warn!("主题登记失败：{e}");
        }
        result
    }

    /// 主题是否已登记
    pub async fn contains(&self, name: &str) -> bool {
        self.attempted.lock().await.contains(name)
    }
}
