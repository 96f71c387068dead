//! # **transit** 的 Kafka 实现
//!
//! 主题管理、生产者、消费者与重新平衡上下文、变更日志回放、
//! Avro 编解码与模式注册，以及流式 SQL 引擎客户端。

#![warn(missing_docs)]

pub mod admin;
pub mod avro;
pub mod changelog;
pub mod config;
pub mod consumer;
pub mod ksql;
pub mod producer;

pub use admin::KafkaAdmin;
pub use avro::{AvroCodec, RegisteredSchema, SchemaRegistry};
pub use config::KafkaConfig;
pub use consumer::{AssignContext, KafkaConsumer};
pub use ksql::{KsqlClient, Statement, Submission};
pub use producer::{DeliveryContext, KafkaProducer};
