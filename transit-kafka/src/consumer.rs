//! # Kafka 消费者
//!
//! 重新平衡回调中由 [`AssignCoordinator`] 决定各分区的起始偏移后再指派。

use crate::config::KafkaConfig;
use rdkafka::{
    ClientContext, Message, TopicPartitionList,
    consumer::{BaseConsumer, Consumer, ConsumerContext},
    error::{KafkaError, KafkaResult},
    types::RDKafkaRespErr,
};
use std::{sync::Mutex, time::Duration};
use tracing::{debug, error, info};
use transit::{
    AssignCoordinator, Assignment, Offset, PollOutcome, Record, TopicPartition, TransitError,
    config::ConsumerConfig, domain::Poll,
};

pub(crate) fn to_offset(offset: rdkafka::Offset) -> Offset {
    match offset {
        rdkafka::Offset::Beginning => Offset::Beginning,
        rdkafka::Offset::End => Offset::End,
        rdkafka::Offset::Stored => Offset::Stored,
        rdkafka::Offset::Invalid => Offset::Default,
        rdkafka::Offset::Offset(n) => Offset::At(n),
        rdkafka::Offset::OffsetTail(n) => Offset::Tail(n),
    }
}

pub(crate) fn from_offset(offset: Offset) -> rdkafka::Offset {
    match offset {
        Offset::Beginning => rdkafka::Offset::Beginning,
        Offset::End => rdkafka::Offset::End,
        Offset::Stored => rdkafka::Offset::Stored,
        Offset::Default => rdkafka::Offset::Invalid,
        Offset::At(n) => rdkafka::Offset::Offset(n),
        Offset::Tail(n) => rdkafka::Offset::OffsetTail(n),
    }
}

pub(crate) fn to_assignment(tpl: &TopicPartitionList) -> Assignment {
    tpl.elements()
        .iter()
        .map(|e| TopicPartition {
            topic: e.topic().to_string(),
            partition: e.partition(),
            offset: to_offset(e.offset()),
        })
        .collect()
}

pub(crate) fn to_tpl(assignment: &Assignment) -> KafkaResult<TopicPartitionList> {
    let mut tpl = TopicPartitionList::with_capacity(assignment.len());
    for tp in assignment.partitions() {
        tpl.add_partition_offset(&tp.topic, tp.partition, from_offset(tp.offset))?;
    }
    Ok(tpl)
}

pub(crate) fn to_record<M: Message>(msg: &M) -> Record {
    Record {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(<[u8]>::to_vec),
        payload: msg.payload().map(<[u8]>::to_vec),
        timestamp: msg.timestamp().to_millis(),
    }
}

pub(crate) fn to_outcome<M: Message>(polled: Option<KafkaResult<M>>) -> PollOutcome {
    match polled {
        None => PollOutcome::Empty,
        Some(Ok(msg)) => PollOutcome::Delivered(to_record(&msg)),
        Some(Err(e)) => PollOutcome::Error(TransitError::Consume(e.to_string())),
    }
}

/// 指派上下文
pub struct AssignContext {
    coordinator: AssignCoordinator,
}

impl AssignContext {
    /// 构造函数
    pub fn new(coordinator: AssignCoordinator) -> Self {
        Self { coordinator }
    }

    fn committed(&self, proposed: &TopicPartitionList) -> KafkaResult<TopicPartitionList> {
        to_tpl(&self.coordinator.on_assign(to_assignment(proposed)))
    }
}

impl ClientContext for AssignContext {}

impl ConsumerContext for AssignContext {
    fn rebalance(
        &self,
        base_consumer: &BaseConsumer<Self>,
        err: RDKafkaRespErr,
        tpl: &mut TopicPartitionList,
    ) {
        let result = match err {
            RDKafkaRespErr::RD_KAFKA_RESP_ERR__ASSIGN_PARTITIONS => self
                .committed(tpl)
                .and_then(|committed| base_consumer.assign(&committed)),
            RDKafkaRespErr::RD_KAFKA_RESP_ERR__REVOKE_PARTITIONS => {
                info!(
                    pattern = %self.coordinator.topic_pattern(),
                    partitions = tpl.count(),
                    "撤销分区指派"
                );
                base_consumer.unassign()
            }
            _ => {
                error!("重新平衡错误：{err:?}");
                base_consumer.unassign()
            }
        };
        if let Err(e) = result {
            error!(pattern = %self.coordinator.topic_pattern(), "分区指派失败：{e}");
        }
    }
}

/// Kafka 消费者
///
/// 关闭后底层连接被释放，轮询总是返回 [`PollOutcome::Empty`]。
pub struct KafkaConsumer {
    name: String,
    inner: Mutex<Option<BaseConsumer<AssignContext>>>,
}

impl KafkaConsumer {
    /// 创建消费者并订阅主题模式
    ///
    /// 以 `^` 开头的模式按正则匹配主题。
    pub fn subscribe(
        cfg: &KafkaConfig,
        consumer: &ConsumerConfig,
        pattern: &str,
    ) -> Result<Self, TransitError> {
        let coordinator = AssignCoordinator::new(pattern, consumer.offset_policy());
        let inner: BaseConsumer<AssignContext> = cfg
            .consumer_config(consumer)
            .create_with_context(AssignContext::new(coordinator))
            .map_err(|e| TransitError::Consume(e.to_string()))?;
        inner
            .subscribe(&[pattern])
            .map_err(|e| TransitError::Consume(e.to_string()))?;
        info!(pattern, group_id = %consumer.group_id, "订阅主题");
        Ok(Self {
            name: pattern.to_string(),
            inner: Mutex::new(Some(inner)),
        })
    }

    /// 订阅的主题模式
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Poll for KafkaConsumer {
    fn poll(&self, timeout: Duration) -> PollOutcome {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(e) => return PollOutcome::Error(TransitError::Consume(e.to_string())),
        };
        match guard.as_ref() {
            Some(consumer) => to_outcome(consumer.poll(timeout)),
            None => PollOutcome::Empty,
        }
    }

    fn close(&self) {
        let consumer = match self.inner.lock() {
            Ok(mut g) => g.take(),
            Err(e) => e.into_inner().take(),
        };
        if let Some(consumer) = consumer {
            consumer.unsubscribe();
            drop(consumer);
            info!(pattern = %self.name, "关闭消费者");
        } else {
            debug!(pattern = %self.name, "消费者已关闭");
        }
    }
}

impl Drop for KafkaConsumer {
    fn drop(&mut self) {
        self.close();
    }
}

/// 创建仅按分区指派、不加入消费组的读取者
pub(crate) fn reader(cfg: &KafkaConfig, group_id: &str) -> Result<BaseConsumer, KafkaError> {
    let consumer = ConsumerConfig {
        group_id: group_id.to_string(),
        client_id: group_id.to_string(),
        ..ConsumerConfig::default()
    };
    let mut config = cfg.consumer_config(&consumer);
    config.set("enable.auto.commit", "false");
    config.create()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use transit::OffsetPolicy;

    const TOPIC: &str = "org.chicago.cta.station.arrivals.clark_and_lake";

    #[fixture]
    fn proposed() -> TopicPartitionList {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(TOPIC, 0, rdkafka::Offset::Invalid)
            .unwrap();
        tpl.add_partition_offset(TOPIC, 1, rdkafka::Offset::Offset(17))
            .unwrap();
        tpl
    }

    #[rstest]
    #[case(rdkafka::Offset::Invalid, Offset::Default)]
    #[case(rdkafka::Offset::Offset(42), Offset::At(42))]
    #[case(rdkafka::Offset::OffsetTail(3), Offset::Tail(3))]
    fn offsets_map_both_ways(#[case] native: rdkafka::Offset, #[case] core: Offset) {
        assert_eq!(to_offset(native), core);
        assert_eq!(from_offset(core), native);
    }

    #[rstest]
    fn earliest_context_rewinds_every_partition(proposed: TopicPartitionList) {
        let context = AssignContext::new(AssignCoordinator::new(
            "^org.chicago.cta.station.arrivals.*",
            OffsetPolicy::Earliest,
        ));

        let committed = context.committed(&proposed).unwrap();

        assert_eq!(committed.count(), 2);
        assert!(
            committed
                .elements()
                .iter()
                .all(|e| e.offset() == rdkafka::Offset::Beginning)
        );
    }

    #[rstest]
    fn broker_default_context_keeps_offsets(proposed: TopicPartitionList) {
        let context = AssignContext::new(AssignCoordinator::new(
            "^org.chicago.cta.station.arrivals.*",
            OffsetPolicy::BrokerDefault,
        ));

        let committed = context.committed(&proposed).unwrap();

        assert_eq!(to_assignment(&committed), to_assignment(&proposed));
        assert_eq!(
            committed.find_partition(TOPIC, 1).unwrap().offset(),
            rdkafka::Offset::Offset(17)
        );
    }
}
