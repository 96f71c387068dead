mod common;

use common::*;
use std::time::Duration;
use transit::{OffsetPolicy, TopicSpec, domain::Config};
use transit_kafka::KafkaConfig;

#[test]
fn default_config_is_loaded() {
    init();
    let cfg = KafkaConfig::get().unwrap();

    assert_eq!(cfg.bootstrap, "PLAINTEXT://localhost:9092");
    assert_eq!(cfg.schema_registry, "http://localhost:8081");
    assert_eq!(cfg.client_id, "sim-producer");
    assert_eq!(cfg.flush_timeout, Duration::from_secs(30));
    assert_eq!(cfg.cp.get("linger.ms").unwrap(), "5");
}

#[test]
fn named_sections_are_loaded() {
    init();
    let cfg = KafkaConfig::get().unwrap();

    assert_eq!(
        cfg.topic_spec("stations_table", "org.chicago.cta.stations.table.v1"),
        TopicSpec::new("org.chicago.cta.stations.table.v1", 1, 1)
    );
    let stations = cfg.consumers.get("stations");
    assert_eq!(stations.group_id, "stations-stream");
    assert!(!stations.is_avro);
    assert_eq!(stations.to_drain_config().yield_every.map(|n| n.get()), Some(256));
    let turnstile = cfg.consumers.get("turnstile");
    assert_eq!(turnstile.offset_policy(), OffsetPolicy::Earliest);
    assert_eq!(turnstile.client_id, "sim-consumer");
}

#[test]
fn reload_keeps_config_available() {
    init();
    KafkaConfig::get().unwrap();

    KafkaConfig::reload().unwrap();

    assert_eq!(KafkaConfig::get().unwrap().ksql_url, "http://localhost:8088");
}
