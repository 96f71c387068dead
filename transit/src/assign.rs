//! # 分区指派协调
//!
//! 由客户端在分区（重新）指派时同步调用，不得执行阻塞 I/O。

use crate::record::{Assignment, Offset};
use serde::Deserialize;
use tracing::info;

/// 起始偏移策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetPolicy {
    /// 所有分区从最早保留的偏移开始
    Earliest,
    /// 沿用 broker 默认的起始偏移
    #[default]
    BrokerDefault,
}

impl From<bool> for OffsetPolicy {
    fn from(offset_earliest: bool) -> Self {
        match offset_earliest {
            true => OffsetPolicy::Earliest,
            false => OffsetPolicy::BrokerDefault,
        }
    }
}

/// 分区指派协调者
#[derive(Debug, Clone)]
pub struct AssignCoordinator {
    topic_pattern: String,
    policy: OffsetPolicy,
}

impl AssignCoordinator {
    /// 构造函数
    pub fn new(topic_pattern: impl Into<String>, policy: OffsetPolicy) -> Self {
        Self {
            topic_pattern: topic_pattern.into(),
            policy,
        }
    }

    /// 订阅的主题模式
    pub fn topic_pattern(&self) -> &str {
        &self.topic_pattern
    }

    /// 起始偏移策略
    pub fn policy(&self) -> OffsetPolicy {
        self.policy
    }

    /// 处理 broker 提议的指派，返回需生效的指派
    pub fn on_assign(&self, mut assignment: Assignment) -> Assignment {
        if self.policy == OffsetPolicy::Earliest {
            assignment.set_all_offsets(Offset::Beginning);
        }
        info!(
            pattern = %self.topic_pattern,
            partitions = assignment.len(),
            "完成 {} 分区指派",
            self.topic_pattern
        );
        assignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TopicPartition;
    use rstest::*;

    #[fixture]
    fn proposed() -> Assignment {
        Assignment::new(vec![
            TopicPartition {
                topic: "org.chicago.cta.station.arrivals".to_string(),
                partition: 0,
                offset: Offset::Default,
            },
            TopicPartition {
                topic: "org.chicago.cta.station.arrivals".to_string(),
                partition: 1,
                offset: Offset::At(42),
            },
            TopicPartition {
                topic: "org.chicago.cta.station.arrivals".to_string(),
                partition: 2,
                offset: Offset::Stored,
            },
        ])
    }

    #[rstest]
    fn earliest_rewrites_every_partition(proposed: Assignment) {
        let coordinator = AssignCoordinator::new("^org.chicago.cta.station.*", OffsetPolicy::Earliest);

        let committed = coordinator.on_assign(proposed);

        assert_eq!(committed.len(), 3);
        assert!(
            committed
                .partitions()
                .iter()
                .all(|tp| tp.offset == Offset::Beginning)
        );
    }

    #[rstest]
    fn broker_default_leaves_offsets_untouched(proposed: Assignment) {
        let coordinator =
            AssignCoordinator::new("^org.chicago.cta.station.*", OffsetPolicy::BrokerDefault);

        let committed = coordinator.on_assign(proposed.clone());

        assert_eq!(committed, proposed);
    }

    #[test]
    fn empty_assignment_passes_through() {
        let coordinator = AssignCoordinator::new("org.chicago.cta.turnstile", OffsetPolicy::Earliest);

        assert!(coordinator.on_assign(Assignment::default()).is_empty());
    }

    #[test]
    fn policy_from_flag() {
        assert_eq!(OffsetPolicy::from(true), OffsetPolicy::Earliest);
        assert_eq!(OffsetPolicy::from(false), OffsetPolicy::BrokerDefault);
    }
}
