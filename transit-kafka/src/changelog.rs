//! # 变更日志回放
//!
//! 从头读取变更日志主题直至启动时的高水位，用于恢复物化表。

use crate::{
    admin::partitions_of,
    config::KafkaConfig,
    consumer::{reader, to_record},
};
use ahash::AHashMap;
use rdkafka::{
    Message, TopicPartitionList,
    consumer::{BaseConsumer, Consumer},
};
use std::time::Instant;
use tracing::{debug, info, instrument};
use transit::{Record, TransitError};

fn read_error(e: impl ToString) -> TransitError {
    TransitError::Consume(e.to_string())
}

/// 记录分区的下一读取偏移，达到高水位时移出待读集合并返回 `true`
fn mark_read(remaining: &mut AHashMap<i32, i64>, partition: i32, next: i64) -> bool {
    if remaining.get(&partition).is_some_and(|high| next >= *high) {
        remaining.remove(&partition);
        debug!(partition, "分区回放完成");
        return true;
    }
    false
}

/// 按消费位置判断完成，覆盖以事务控制标记结尾、读不到 `high - 1` 的分区
fn mark_positions(
    consumer: &BaseConsumer,
    topic: &str,
    remaining: &mut AHashMap<i32, i64>,
) -> Result<(), TransitError> {
    let position = consumer.position().map_err(read_error)?;
    for elem in position.elements_for_topic(topic) {
        if let rdkafka::Offset::Offset(next) = elem.offset() {
            mark_read(remaining, elem.partition(), next);
        }
    }
    Ok(())
}

/// 读取变更日志主题的全部记录
///
/// 读取者不加入消费组，也不提交偏移。超过 `cfg.timeout` 仍未读到高水位时返回错误。
#[instrument(name = "restore_changelog", skip(cfg))]
pub fn restore(cfg: &KafkaConfig, topic: &str) -> Result<Vec<Record>, TransitError> {
    let consumer = reader(cfg, &format!("{topic}-restore")).map_err(read_error)?;
    let metadata = consumer
        .fetch_metadata(Some(topic), cfg.timeout)
        .map_err(read_error)?;

    let mut tpl = TopicPartitionList::new();
    let mut remaining = AHashMap::new();
    for pid in partitions_of(&metadata, topic) {
        let (low, high) = consumer
            .fetch_watermarks(topic, pid, cfg.timeout)
            .map_err(read_error)?;
        if high > low {
            tpl.add_partition_offset(topic, pid, rdkafka::Offset::Beginning)
                .map_err(read_error)?;
            remaining.insert(pid, high);
        }
    }

    let mut records = Vec::new();
    if remaining.is_empty() {
        info!("变更日志为空");
        return Ok(records);
    }
    consumer.assign(&tpl).map_err(read_error)?;

    let mut deadline = Instant::now() + cfg.timeout;
    while !remaining.is_empty() {
        match consumer.poll(cfg.timeout) {
            Some(Ok(msg)) => {
                mark_read(&mut remaining, msg.partition(), msg.offset() + 1);
                records.push(to_record(&msg));
                deadline = Instant::now() + cfg.timeout;
            }
            Some(Err(e)) => return Err(read_error(e)),
            None => {
                mark_positions(&consumer, topic, &mut remaining)?;
                if !remaining.is_empty() && Instant::now() >= deadline {
                    return Err(TransitError::Consume(format!(
                        "变更日志 {topic} 未在超时内读到高水位"
                    )));
                }
            }
        }
    }

    info!(count = records.len(), "完成变更日志读取");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remaining_of<const N: usize>(highs: [(i32, i64); N]) -> AHashMap<i32, i64> {
        highs.into_iter().collect()
    }

    #[test]
    fn partition_done_at_high_watermark() {
        let mut remaining = remaining_of([(0, 3), (1, 5)]);

        assert!(!mark_read(&mut remaining, 0, 2));
        assert!(mark_read(&mut remaining, 0, 3));
        assert!(!mark_read(&mut remaining, 0, 4));

        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(&1));
    }

    #[test]
    fn position_past_control_marker_completes_partition() {
        // 最后一条数据位于偏移 3，偏移 4 是事务提交标记，高水位为 5
        let mut remaining = remaining_of([(0, 5)]);

        assert!(!mark_read(&mut remaining, 0, 4));
        assert!(mark_read(&mut remaining, 0, 5));

        assert!(remaining.is_empty());
    }

    #[test]
    fn unknown_partition_is_ignored() {
        let mut remaining = remaining_of([(0, 1)]);

        assert!(!mark_read(&mut remaining, 7, 100));
        assert_eq!(remaining.len(), 1);
    }
}
