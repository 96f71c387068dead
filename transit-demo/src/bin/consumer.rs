use std::sync::Arc;
use tracing::info;
use transit::{
    App, Codec, JsonCodec, Record, TransitError, domain::Config, shutdown_signal,
    station::Turnstile,
};
use transit_demo::TURNSTILE_TOPIC;
use transit_kafka::{AvroCodec, KafkaConfig, KafkaConsumer, SchemaRegistry};

fn logger<C: Codec + 'static>(codec: C) -> impl FnMut(Record) -> Result<(), TransitError> + Send {
    move |record: Record| {
        let event: Turnstile = codec.decode_value(record.payload()?)?;
        info!(
            offset = record.offset,
            station_id = event.station_id,
            line = %event.line,
            "收到闸机事件"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), TransitError> {
    let _guard = transit_demo::init_logging();
    let cfg = KafkaConfig::get()?;
    let consumer_cfg = cfg.consumers.get("turnstile");
    let consumer = Arc::new(KafkaConsumer::subscribe(
        &cfg,
        &consumer_cfg,
        &format!("^{TURNSTILE_TOPIC}"),
    )?);

    let app = App::new();
    if consumer_cfg.is_avro {
        let schemas = SchemaRegistry::new(&cfg.schema_registry, cfg.timeout)?;
        let codec = AvroCodec::latest(&schemas, TURNSTILE_TOPIC).await?;
        app.launch("turnstile", consumer, logger(codec), consumer_cfg.to_drain_config())
            .await?;
    } else {
        app.launch("turnstile", consumer, logger(JsonCodec), consumer_cfg.to_drain_config())
            .await?;
    }

    shutdown_signal().await;
    for (name, stats) in app.shutdown().await {
        info!(name, delivered = stats.delivered, errors = stats.errors, "消费任务统计");
    }
    Ok(())
}
