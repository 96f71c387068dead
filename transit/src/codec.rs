//! # 键值编解码

use crate::errors::TransitError;
use serde::{Serialize, de::DeserializeOwned};

/// 编解码特征
pub trait Codec: Send + Sync {
    /// 序列化消息键
    fn encode_key<K: Serialize>(&self, key: &K) -> Result<Vec<u8>, TransitError>;
    /// 序列化消息体
    fn encode_value<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, TransitError>;
    /// 反序列化消息键
    fn decode_key<K: DeserializeOwned>(&self, bytes: &[u8]) -> Result<K, TransitError>;
    /// 反序列化消息体
    fn decode_value<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, TransitError>;
}

/// JSON 编解码
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_key<K: Serialize>(&self, key: &K) -> Result<Vec<u8>, TransitError> {
        Ok(serde_json::to_vec(key)?)
    }

    fn encode_value<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, TransitError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode_key<K: DeserializeOwned>(&self, bytes: &[u8]) -> Result<K, TransitError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn decode_value<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, TransitError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
