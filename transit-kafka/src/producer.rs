//! # Kafka 生产者
//!
//! 基于 `ThreadedProducer`，投递在客户端后台线程完成。投递失败由上下文记录并计数，
//! 在下一次刷新时以错误上报。

use crate::config::KafkaConfig;
use rdkafka::{
    ClientContext, Message,
    error::KafkaError,
    producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer},
    types::RDKafkaErrorCode,
};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{error, info, warn};
use transit::{TransitError, domain::Produce};

const QUEUE_FULL_RETRIES: usize = 50;
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// 投递报告上下文
#[derive(Debug, Default)]
pub struct DeliveryContext {
    delivered: AtomicU64,
    failed: AtomicU64,
    settled: AtomicU64,
}

impl DeliveryContext {
    /// 已确认投递数
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// 投递失败数
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn on_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn on_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// 结算上次结算以来的投递失败，有失败时返回错误
    fn settle(&self) -> Result<(), TransitError> {
        let failed = self.failed();
        let previous = self.settled.swap(failed, Ordering::Relaxed);
        match failed.saturating_sub(previous) {
            0 => Ok(()),
            n => Err(TransitError::Flush(format!("{n} 条消息投递失败"))),
        }
    }
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        match delivery_result {
            Ok(_) => self.on_delivered(),
            Err((e, msg)) => {
                self.on_failed();
                error!(
                    topic = msg.topic(),
                    partition = msg.partition(),
                    "消息投递失败：{e}"
                );
            }
        }
    }
}

/// Kafka 生产者
pub struct KafkaProducer {
    inner: ThreadedProducer<DeliveryContext>,
}

impl KafkaProducer {
    /// 构造函数
    pub fn new(cfg: &KafkaConfig) -> Result<Self, TransitError> {
        let inner = cfg
            .producer_config()
            .create_with_context(DeliveryContext::default())
            .map_err(|e| TransitError::Publish(e.to_string()))?;
        info!(client_id = %cfg.client_id, "创建生产者");
        Ok(Self { inner })
    }

    /// 投递报告
    pub fn context(&self) -> &DeliveryContext {
        self.inner.context()
    }
}

impl Produce for KafkaProducer {
    fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransitError> {
        let mut record: BaseRecord<'_, [u8], [u8]> = BaseRecord::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        let mut retries = 0;
        loop {
            match self.inner.send(record) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), rec))
                    if retries < QUEUE_FULL_RETRIES =>
                {
                    if retries == 0 {
                        warn!(topic, "发送队列已满，等待后台投递");
                    }
                    retries += 1;
                    record = rec;
                    std::thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err((e, _)) => return Err(TransitError::Publish(e.to_string())),
            }
        }
    }

    fn flush(&self, timeout: Duration) -> Result<(), TransitError> {
        self.inner
            .flush(timeout)
            .map_err(|e| TransitError::Flush(e.to_string()))?;
        let context = self.context();
        info!(
            delivered = context.delivered(),
            failed = context.failed(),
            "完成发送缓冲刷新"
        );
        context.settle()
    }
}
