//! # **transit** 特征

use crate::{
    errors::{ConfigError, TransitError},
    record::{PollOutcome, Record, TopicSpec},
};
use std::{future::Future, sync::Arc, time::Duration};

/// 配置特征
pub trait Config: Sized {
    /// 获取配置
    fn get() -> Result<Self, ConfigError>;
    /// 重新加载配置
    fn reload() -> Result<(), ConfigError>;
}

/// 主题管理特征
pub trait Admin: Send + Sync {
    /// 查询主题是否存在
    fn topic_exists(&self, name: &str) -> impl Future<Output = Result<bool, TransitError>> + Send;

    /// 按规格创建主题
    fn create_topic(&self, spec: &TopicSpec)
    -> impl Future<Output = Result<(), TransitError>> + Send;
}

/// 生产者特征
///
/// 发送只负责交给底层缓冲，实际投递在客户端内部线程异步完成。
pub trait Produce: Send + Sync {
    /// 发送键值到主题
    fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransitError>;

    /// 阻塞直至缓冲消息全部确认，或超时
    fn flush(&self, timeout: Duration) -> Result<(), TransitError>;
}

/// 消费者特征
pub trait Poll: Send + Sync {
    /// 在超时内轮询一条消息
    fn poll(&self, timeout: Duration) -> PollOutcome;

    /// 释放底层连接及消费组成员身份，可重复调用
    fn close(&self);
}

impl<T: Produce + ?Sized> Produce for Arc<T> {
    fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), TransitError> {
        (**self).send(topic, key, payload)
    }

    fn flush(&self, timeout: Duration) -> Result<(), TransitError> {
        (**self).flush(timeout)
    }
}

impl<T: Poll + ?Sized> Poll for Arc<T> {
    fn poll(&self, timeout: Duration) -> PollOutcome {
        (**self).poll(timeout)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// 消息处理特征
pub trait Handle: Send {
    /// 同步处理一条记录
    fn handle(&mut self, record: Record) -> Result<(), TransitError>;
}

impl<F> Handle for F
where
    F: FnMut(Record) -> Result<(), TransitError> + Send,
{
    fn handle(&mut self, record: Record) -> Result<(), TransitError> {
        self(record)
    }
}
