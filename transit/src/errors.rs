//! # **transit** 错误定义

use thiserror::Error;

/// **transit** 运行错误枚举
#[derive(Debug, Error)]
pub enum TransitError {
    /// 主题创建失败
    #[error("主题 {topic} 创建失败：{reason}")]
    Provision {
        /// 主题名称
        topic: String,
        /// 失败原因
        reason: String,
    },
    /// 查询主题元数据错误
    #[error("查询主题元数据错误：{0}")]
    Metadata(String),
    /// 发布消息错误
    #[error("发布消息错误：{0}")]
    Publish(String),
    /// 刷新缓冲消息错误
    #[error("刷新缓冲消息错误：{0}")]
    Flush(String),
    /// 发布者已关闭
    #[error("发布者已关闭")]
    Closed,
    /// 序列化错误
    #[error("序列化错误：{0}")]
    Codec(String),
    /// 消息处理错误
    #[error("消息处理错误：{0}")]
    MsgError(String),
    /// 消费者错误
    #[error("消费者错误：{0}")]
    Consume(String),
    /// 查询引擎返回非 2xx 状态
    #[error("查询引擎返回状态 {status}：{body}")]
    Query {
        /// HTTP 状态码
        status: u16,
        /// 响应内容
        body: String,
    },
    /// 无法访问查询引擎或模式注册中心
    #[error("HTTP 请求错误：{0}")]
    Http(String),
    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<&str> for TransitError {
    fn from(s: &str) -> Self {
        TransitError::MsgError(s.to_owned())
    }
}

impl From<serde_json::Error> for TransitError {
    fn from(e: serde_json::Error) -> Self {
        TransitError::Codec(e.to_string())
    }
}

/// 配置错误枚举
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 加载配置源错误
    #[error("加载配置错误：{0}")]
    Load(#[from] ::config::ConfigError),
    /// 配置验证错误
    #[error("配置'{section}.{key}'验证失败：{message}")]
    ValidationError {
        /// 配置节
        section: String,
        /// 命名配置键
        key: String,
        /// 验证信息
        message: String,
    },
    /// 配置缓存锁中毒
    #[error("配置缓存不可用：{0}")]
    Poisoned(String),
}
