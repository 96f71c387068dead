use std::sync::Arc;
use tracing::info;
use transit::{
    App, JsonCodec, Materializer, Table, TopicRegistry, TransitError,
    domain::{Config, Produce},
    shutdown_signal,
    station::StationTransform,
};
use transit_demo::{RAW_STATIONS_TOPIC, STATIONS_CHANGELOG_TOPIC};
use transit_kafka::{KafkaAdmin, KafkaConfig, KafkaConsumer, KafkaProducer, changelog};

#[tokio::main]
async fn main() -> Result<(), TransitError> {
    let _guard = transit_demo::init_logging();
    let cfg = KafkaConfig::get()?;
    let admin = KafkaAdmin::new(&cfg)?;
    let registry = TopicRegistry::new();
    registry
        .ensure(
            &admin,
            &cfg.topic_spec("stations_table", STATIONS_CHANGELOG_TOPIC),
        )
        .await?;

    let producer = Arc::new(KafkaProducer::new(&cfg)?);
    let mut table: Table<StationTransform, _, _> = Table::new(
        "stations_table",
        STATIONS_CHANGELOG_TOPIC,
        Arc::clone(&producer),
        JsonCodec,
    );
    table.recover(changelog::restore(&cfg, STATIONS_CHANGELOG_TOPIC)?)?;
    info!(entries = table.len(), "完成车站表恢复");

    let consumer_cfg = cfg.consumers.get("stations");
    let consumer = Arc::new(KafkaConsumer::subscribe(
        &cfg,
        &consumer_cfg,
        RAW_STATIONS_TOPIC,
    )?);
    let app = App::new();
    app.launch(
        "stations-stream",
        consumer,
        Materializer::new(JsonCodec, table),
        consumer_cfg.to_drain_config(),
    )
    .await?;

    shutdown_signal().await;
    app.shutdown().await;
    producer.flush(cfg.flush_timeout)?;
    info!("车站流退出");
    Ok(())
}
