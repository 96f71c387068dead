//! # 记录、主题与分区指派模型

use crate::errors::TransitError;

/// 主题规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// 主题名称
    pub name: String,
    /// 分区数
    pub partitions: i32,
    /// 副本数
    pub replicas: i32,
}

impl TopicSpec {
    /// 构造函数
    pub fn new(name: impl Into<String>, partitions: i32, replicas: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replicas,
        }
    }
}

/// 从主题读取的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 主题
    pub topic: String,
    /// 分区
    pub partition: i32,
    /// 偏移
    pub offset: i64,
    /// 消息键
    pub key: Option<Vec<u8>>,
    /// 消息体
    pub payload: Option<Vec<u8>>,
    /// 时间戳（毫秒）
    pub timestamp: Option<i64>,
}

impl Record {
    /// 消息键，缺失时返回错误
    pub fn key(&self) -> Result<&[u8], TransitError> {
        Ok(self.key.as_deref().ok_or("消息键不存在")?)
    }

    /// 消息体，缺失时返回错误
    pub fn payload(&self) -> Result<&[u8], TransitError> {
        Ok(self.payload.as_deref().ok_or("空消息体")?)
    }
}

/// 单次轮询结果
#[derive(Debug)]
pub enum PollOutcome {
    /// 超时内无可用消息
    Empty,
    /// 消息或客户端错误，可恢复
    Error(TransitError),
    /// 收到消息
    Delivered(Record),
}

/// 分区起始偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// 最早保留的偏移
    Beginning,
    /// 最新偏移
    End,
    /// 消费组已提交的偏移
    Stored,
    /// 未指定，由 broker 按重置策略决定
    Default,
    /// 具体偏移
    At(i64),
    /// 距末尾的偏移
    Tail(i64),
}

/// 主题分区及其起始偏移
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartition {
    /// 主题
    pub topic: String,
    /// 分区
    pub partition: i32,
    /// 起始偏移
    pub offset: Offset,
}

/// broker 下发的分区指派
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    partitions: Vec<TopicPartition>,
}

impl Assignment {
    /// 构造函数
    pub fn new(partitions: Vec<TopicPartition>) -> Self {
        Self { partitions }
    }

    /// 指派的分区
    pub fn partitions(&self) -> &[TopicPartition] {
        &self.partitions
    }

    /// 统一设置所有分区的起始偏移
    pub fn set_all_offsets(&mut self, offset: Offset) {
        for tp in &mut self.partitions {
            tp.offset = offset;
        }
    }

    /// 分区数
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// 是否为空指派
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

impl IntoIterator for Assignment {
    type Item = TopicPartition;
    type IntoIter = std::vec::IntoIter<TopicPartition>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

impl FromIterator<TopicPartition> for Assignment {
    fn from_iter<I: IntoIterator<Item = TopicPartition>>(iter: I) -> Self {
        Self {
            partitions: iter.into_iter().collect(),
        }
    }
}
