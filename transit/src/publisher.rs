//! # 记录发布者

use crate::{
    codec::Codec,
    domain::{Admin, Produce},
    errors::TransitError,
    record::TopicSpec,
    registry::TopicRegistry,
};
use serde::Serialize;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime},
};
use tracing::{debug, error, info, instrument};

/// 当前毫秒时间戳，用作事件消息键
pub fn time_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// 发布者结构
///
/// 构造时经由 [`TopicRegistry`] 确保主题存在；关闭时刷新缓冲消息，
/// 未显式关闭的发布者在析构时补做刷新。
pub struct Publisher<P, C>
where
    P: Produce,
    C: Codec,
{
    topic: TopicSpec,
    producer: P,
    codec: C,
    flush_timeout: Duration,
    closed: AtomicBool,
}

impl<P, C> Publisher<P, C>
where
    P: Produce,
    C: Codec,
{
    /// 构造发布者
    #[instrument(name = "build_publisher", skip_all, fields(topic = %topic.name))]
    pub async fn new<A: Admin>(
        registry: &TopicRegistry,
        admin: &A,
        topic: TopicSpec,
        producer: P,
        codec: C,
        flush_timeout: Duration,
    ) -> Result<Self, TransitError> {
        registry.ensure(admin, &topic).await?;
        info!("成功创建发布者");
        Ok(Self {
            topic,
            producer,
            codec,
            flush_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// 目标主题
    pub fn topic(&self) -> &str {
        &self.topic.name
    }

    /// 发布键值
    pub fn publish<K, V>(&self, key: &K, value: &V) -> Result<(), TransitError>
    where
        K: Serialize,
        V: Serialize,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransitError::Closed);
        }
        let key = self.codec.encode_key(key)?;
        let value = self.codec.encode_value(value)?;
        self.producer.send(&self.topic.name, Some(&key), &value)?;
        debug!(topic = %self.topic.name, "消息进入发送缓冲");
        Ok(())
    }

    /// 刷新缓冲并关闭，重复调用无副作用
    #[instrument(name = "close_publisher", skip(self), fields(topic = %self.topic.name))]
    pub fn close(&self) -> Result<(), TransitError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return Ok(());
        }
        info!("刷新发送缓冲");
        self.producer.flush(self.flush_timeout)
    }
}

impl<P, C> Drop for Publisher<P, C>
where
    P: Produce,
    C: Codec,
{
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(topic = %self.topic.name, "析构时刷新发送缓冲失败：{e}");
        }
    }
}
