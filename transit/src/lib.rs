//! # **transit** 核心库
//!
//! 与 broker 无关的事件管道构件：主题登记、记录发布、分区指派协调、
//! 轮询排空循环，以及带变更日志的流式物化表。

#![warn(missing_docs)]

pub mod app;
pub mod assign;
pub mod codec;
pub mod config;
pub mod domain;
pub mod drain;
pub mod errors;
pub mod publisher;
pub mod record;
pub mod registry;
pub mod station;
pub mod table;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use app::{App, shutdown_signal};
pub use assign::{AssignCoordinator, OffsetPolicy};
pub use codec::{Codec, JsonCodec};
pub use drain::{DrainConfig, DrainLoop, LoopState, LoopStats};
pub use errors::{ConfigError, TransitError};
pub use publisher::{Publisher, time_millis};
pub use record::{Assignment, Offset, PollOutcome, Record, TopicPartition, TopicSpec};
pub use registry::TopicRegistry;
pub use table::{Materializer, Table, Transform};
