#![allow(dead_code)]

use std::sync::{LazyLock, Once};
use tracing::{Level, info};
use tracing_subscriber::fmt;
use transit::domain::Config;
use transit_kafka::{KafkaAdmin, KafkaConfig};
use uuid::Uuid;

static LOG: Once = Once::new();

pub(crate) fn init() {
    LOG.call_once(|| {
        fmt().with_test_writer().with_max_level(Level::DEBUG).init();
        info!("启用 {} 测试日志输出", Level::DEBUG);
    });
}

pub(crate) static CFG: LazyLock<KafkaConfig> = LazyLock::new(|| {
    init();
    KafkaConfig::get().unwrap()
});

pub(crate) static ADMIN: LazyLock<KafkaAdmin> = LazyLock::new(|| KafkaAdmin::new(&CFG).unwrap());

pub(crate) fn random_topic(prefix: &str) -> String {
    format!("{prefix}.{}", Uuid::new_v4())
}
