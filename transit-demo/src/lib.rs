//! # 芝加哥公交事件管道示例

use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
use tracing_subscriber::fmt;

/// 闸机事件主题
pub const TURNSTILE_TOPIC: &str = "org.chicago.transit.turnstile";
/// Kafka Connect 导入的原始车站主题
pub const RAW_STATIONS_TOPIC: &str = "org.chicago.cta.raw.stations";
/// 车站物化表的变更日志主题
pub const STATIONS_CHANGELOG_TOPIC: &str = "org.chicago.cta.stations.table.v1";

/// 闸机事件键模式
pub const TURNSTILE_KEY_SCHEMA: &str = r#""long""#;
/// 闸机事件体模式
pub const TURNSTILE_VALUE_SCHEMA: &str = r#"{
    "namespace": "com.udacity",
    "type": "record",
    "name": "turnstile.value",
    "fields": [
        {"name": "station_id", "type": "int"},
        {"name": "station_name", "type": "string"},
        {"name": "line", "type": {"type": "enum", "name": "line", "symbols": ["red", "blue", "green"]}}
    ]
}"#;

/// 启用标准输出日志，返回的守卫须存活至进程结束
pub fn init_logging() -> WorkerGuard {
    let (non_blocking, guard) = non_blocking(std::io::stdout());
    fmt()
        .with_writer(non_blocking)
        .with_target(false)
        .init();
    guard
}
