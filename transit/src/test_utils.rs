//! # 测试替身
//!
//! 内存实现的主题管理、生产者与脚本化消费者，无需 broker 即可验证管道行为。

use crate::{
    domain::{Admin, Poll, Produce},
    errors::TransitError,
    record::{PollOutcome, Record, TopicSpec},
};
use ahash::AHashSet;
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// 内存主题管理
#[derive(Debug, Default)]
pub struct MemoryAdmin {
    topics: Mutex<AHashSet<String>>,
    create_calls: AtomicUsize,
    failure: Option<String>,
}

impl MemoryAdmin {
    /// 空集群
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置主题的集群
    pub fn with_topics<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: Mutex::new(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// 创建主题总是失败的集群
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// 创建请求次数
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// 主题是否存在
    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.lock().map(|t| t.contains(name)).unwrap_or(false)
    }
}

impl Admin for MemoryAdmin {
    async fn topic_exists(&self, name: &str) -> Result<bool, TransitError> {
        Ok(self.has_topic(name))
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), TransitError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.failure {
            return Err(TransitError::Provision {
                topic: spec.name.clone(),
                reason: reason.clone(),
            });
        }
        self.topics
            .lock()
            .map_err(|e| TransitError::Metadata(e.to_string()))?
            .insert(spec.name.clone());
        Ok(())
    }
}

/// 已发送的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// 主题
    pub topic: String,
    /// 消息键
    pub key: Option<Vec<u8>>,
    /// 消息体
    pub payload: Vec<u8>,
}

/// 内存生产者
///
/// 发送的消息先进入缓冲，刷新后才算确认。
#[derive(Debug, Default)]
pub struct MemoryProducer {
    buffered: Mutex<Vec<Sent>>,
    acked: Mutex<Vec<Sent>>,
    flush_calls: AtomicUsize,
    reject_send: AtomicBool,
    flush_failure: Option<String>,
}

impl MemoryProducer {
    /// 构造函数
    pub fn new() -> Self {
        Self::default()
    }

    /// 刷新总是超时的生产者
    pub fn unreachable() -> Self {
        Self {
            flush_failure: Some("Operation timed out".to_string()),
            ..Self::default()
        }
    }

    /// 之后的发送全部失败
    pub fn reject_sends(&self) {
        self.reject_send.store(true, Ordering::SeqCst);
    }

    /// 所有已发送消息（含未确认）
    pub fn sent(&self) -> Vec<Sent> {
        let acked = self.acked.lock().map(|a| a.clone()).unwrap_or_default();
        let buffered = self.buffered.lock().map(|b| b.clone()).unwrap_or_default();
        acked.into_iter().chain(buffered).collect()
    }

    /// 已确认消息
    pub fn acked(&self) -> Vec<Sent> {
        self.acked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// 刷新次数
    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

impl Produce for MemoryProducer {
    fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransitError> {
        if self.reject_send.load(Ordering::SeqCst) {
            return Err(TransitError::Publish("Local: Queue full".to_string()));
        }
        self.buffered
            .lock()
            .map_err(|e| TransitError::Publish(e.to_string()))?
            .push(Sent {
                topic: topic.to_string(),
                key: key.map(<[u8]>::to_vec),
                payload: payload.to_vec(),
            });
        Ok(())
    }

    fn flush(&self, _timeout: Duration) -> Result<(), TransitError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.flush_failure {
            return Err(TransitError::Flush(reason.clone()));
        }
        let mut buffered = self
            .buffered
            .lock()
            .map_err(|e| TransitError::Flush(e.to_string()))?;
        self.acked
            .lock()
            .map_err(|e| TransitError::Flush(e.to_string()))?
            .extend(buffered.drain(..));
        Ok(())
    }
}

/// 脚本化消费者
///
/// 按预设顺序返回轮询结果，脚本耗尽后总是返回 [`PollOutcome::Empty`]。
#[derive(Debug, Default)]
pub struct ScriptedConsumer {
    script: Mutex<VecDeque<PollOutcome>>,
    polls: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedConsumer {
    /// 构造函数
    pub fn new(script: impl IntoIterator<Item = PollOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 追加轮询结果
    pub fn push(&self, outcome: PollOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// 轮询次数
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// 关闭调用次数
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Poll for ScriptedConsumer {
    fn poll(&self, _timeout: Duration) -> PollOutcome {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return PollOutcome::Empty;
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(PollOutcome::Empty)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// 构造测试记录
pub fn record(topic: &str, offset: i64, key: Option<&[u8]>, payload: &[u8]) -> Record {
    Record {
        topic: topic.to_string(),
        partition: 0,
        offset,
        key: key.map(<[u8]>::to_vec),
        payload: Some(payload.to_vec()),
        timestamp: None,
    }
}

/// 构造投递结果
pub fn delivered(topic: &str, offset: i64, payload: &[u8]) -> PollOutcome {
    PollOutcome::Delivered(record(topic, offset, None, payload))
}

/// 构造错误结果
pub fn errored(reason: &str) -> PollOutcome {
    PollOutcome::Error(TransitError::Consume(reason.to_string()))
}
