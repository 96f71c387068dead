//! # Avro 编解码与模式注册
//!
//! 消息格式：魔数 `0`，大端序 4 字节模式 Id，随后为 Avro 数据。

use apache_avro::Schema;
use reqwest::{Client, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, info, instrument};
use transit::{Codec, TransitError};

const MAGIC_BYTE: u8 = 0;
const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

fn codec_err(e: apache_avro::Error) -> TransitError {
    TransitError::Codec(e.to_string())
}

fn http_err(e: reqwest::Error) -> TransitError {
    TransitError::Http(e.to_string())
}

/// 消息键模式主题
pub fn key_subject(topic: &str) -> String {
    format!("{topic}-key")
}

/// 消息体模式主题
pub fn value_subject(topic: &str) -> String {
    format!("{topic}-value")
}

fn frame(id: u32, datum: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(datum.len() + 5);
    bytes.push(MAGIC_BYTE);
    bytes.extend_from_slice(&id.to_be_bytes());
    bytes.extend_from_slice(datum);
    bytes
}

fn unframe(bytes: &[u8]) -> Result<(u32, &[u8]), TransitError> {
    match bytes {
        [MAGIC_BYTE, a, b, c, d, rest @ ..] => Ok((u32::from_be_bytes([*a, *b, *c, *d]), rest)),
        _ => Err(TransitError::Codec("缺少 Avro 消息头".to_string())),
    }
}

/// 已注册的模式
#[derive(Debug, Clone)]
pub struct RegisteredSchema {
    /// 注册中心分配的 Id
    pub id: u32,
    /// 模式
    pub schema: Schema,
}

impl RegisteredSchema {
    fn encode<T: Serialize>(&self, v: &T) -> Result<Vec<u8>, TransitError> {
        let value = apache_avro::to_value(v)
            .and_then(|value| value.resolve(&self.schema))
            .map_err(codec_err)?;
        let datum = apache_avro::to_avro_datum(&self.schema, value).map_err(codec_err)?;
        Ok(frame(self.id, &datum))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TransitError> {
        let (id, mut body) = unframe(bytes)?;
        if id != self.id {
            return Err(TransitError::Codec(format!(
                "模式 Id {id} 与已注册的 {} 不一致",
                self.id
            )));
        }
        let value =
            apache_avro::from_avro_datum(&self.schema, &mut body, None).map_err(codec_err)?;
        apache_avro::from_value(&value).map_err(codec_err)
    }
}

/// Avro 编解码
#[derive(Debug, Clone)]
pub struct AvroCodec {
    key: Option<RegisteredSchema>,
    value: Option<RegisteredSchema>,
}

impl AvroCodec {
    /// 构造函数
    pub fn new(key: Option<RegisteredSchema>, value: Option<RegisteredSchema>) -> Self {
        Self { key, value }
    }

    /// 注册主题的键值模式
    #[instrument(name = "register_schemas", skip_all, fields(topic = %topic))]
    pub async fn register(
        registry: &SchemaRegistry,
        topic: &str,
        key: Schema,
        value: Schema,
    ) -> Result<Self, TransitError> {
        let key_id = registry.register(&key_subject(topic), &key).await?;
        let value_id = registry.register(&value_subject(topic), &value).await?;
        info!(key_id, value_id, "完成模式注册");
        Ok(Self::new(
            Some(RegisteredSchema {
                id: key_id,
                schema: key,
            }),
            Some(RegisteredSchema {
                id: value_id,
                schema: value,
            }),
        ))
    }

    /// 读取主题最新的消息体模式，键模式可缺失
    pub async fn latest(registry: &SchemaRegistry, topic: &str) -> Result<Self, TransitError> {
        let value = registry.latest(&value_subject(topic)).await?;
        let key = match registry.latest(&key_subject(topic)).await {
            Ok(k) => Some(k),
            Err(e) => {
                debug!(topic, "未取得消息键模式：{e}");
                None
            }
        };
        Ok(Self::new(key, Some(value)))
    }

    fn key_schema(&self) -> Result<&RegisteredSchema, TransitError> {
        self.key
            .as_ref()
            .ok_or_else(|| TransitError::Codec("未配置消息键模式".to_string()))
    }

    fn value_schema(&self) -> Result<&RegisteredSchema, TransitError> {
        self.value
            .as_ref()
            .ok_or_else(|| TransitError::Codec("未配置消息体模式".to_string()))
    }
}

impl Codec for AvroCodec {
    fn encode_key<K: Serialize>(&self, key: &K) -> Result<Vec<u8>, TransitError> {
        self.key_schema()?.encode(key)
    }

    fn encode_value<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, TransitError> {
        self.value_schema()?.encode(value)
    }

    fn decode_key<K: DeserializeOwned>(&self, bytes: &[u8]) -> Result<K, TransitError> {
        self.key_schema()?.decode(bytes)
    }

    fn decode_value<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, TransitError> {
        self.value_schema()?.decode(bytes)
    }
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(Deserialize)]
struct SubjectVersion {
    id: u32,
    schema: String,
}

/// 模式注册中心客户端
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    client: Client,
    url: String,
}

impl SchemaRegistry {
    /// 构造函数
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransitError> {
        let client = Client::builder().timeout(timeout).build().map_err(http_err)?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, TransitError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransitError::Http(format!("模式注册中心返回状态 {status}：{body}")))
    }

    /// 注册模式，返回模式 Id
    pub async fn register(&self, subject: &str, schema: &Schema) -> Result<u32, TransitError> {
        let canonical = schema.canonical_form();
        let body = serde_json::to_vec(&RegisterRequest { schema: &canonical })?;
        let response = self
            .client
            .post(format!("{}/subjects/{subject}/versions", self.url))
            .header(CONTENT_TYPE, REGISTRY_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(http_err)?;
        let registered: RegisterResponse = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        debug!(subject, id = registered.id, "注册模式");
        Ok(registered.id)
    }

    /// 获取主题最新版本的模式
    pub async fn latest(&self, subject: &str) -> Result<RegisteredSchema, TransitError> {
        let response = self
            .client
            .get(format!("{}/subjects/{subject}/versions/latest", self.url))
            .send()
            .await
            .map_err(http_err)?;
        let version: SubjectVersion = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(http_err)?;
        let schema = Schema::parse_str(&version.schema).map_err(codec_err)?;
        Ok(RegisteredSchema {
            id: version.id,
            schema,
        })
    }
}
