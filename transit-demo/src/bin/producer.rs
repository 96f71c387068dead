use apache_avro::Schema;
use std::time::Duration;
use tracing::{error, info};
use transit::{
    Publisher, TopicRegistry, TransitError,
    domain::Config,
    shutdown_signal,
    station::{Line, Turnstile},
    time_millis,
};
use transit_demo::{TURNSTILE_KEY_SCHEMA, TURNSTILE_TOPIC, TURNSTILE_VALUE_SCHEMA};
use transit_kafka::{AvroCodec, KafkaAdmin, KafkaConfig, KafkaProducer, SchemaRegistry};

fn schema(text: &str) -> Result<Schema, TransitError> {
    Schema::parse_str(text).map_err(|e| TransitError::Codec(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), TransitError> {
    let _guard = transit_demo::init_logging();
    let cfg = KafkaConfig::get()?;
    let admin = KafkaAdmin::new(&cfg)?;
    let registry = TopicRegistry::new();
    let schemas = SchemaRegistry::new(&cfg.schema_registry, cfg.timeout)?;
    let codec = AvroCodec::register(
        &schemas,
        TURNSTILE_TOPIC,
        schema(TURNSTILE_KEY_SCHEMA)?,
        schema(TURNSTILE_VALUE_SCHEMA)?,
    )
    .await?;
    let publisher = Publisher::new(
        &registry,
        &admin,
        cfg.topic_spec("turnstile", TURNSTILE_TOPIC),
        KafkaProducer::new(&cfg)?,
        codec,
        cfg.flush_timeout,
    )
    .await?;

    let stations = [
        (40380, "Clark/Lake", Line::Blue),
        (40820, "O'Hare", Line::Blue),
        (41400, "Roosevelt", Line::Red),
        (40680, "Adams/Wabash", Line::Green),
    ];
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut tick: usize = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let (station_id, name, line) = stations[tick % stations.len()];
                let event = Turnstile {
                    station_id,
                    station_name: name.to_string(),
                    line,
                };
                if let Err(e) = publisher.publish(&time_millis(), &event) {
                    error!(station_id, "发布闸机事件失败：{e}");
                }
                tick += 1;
            }
        }
    }

    publisher.close()?;
    info!(published = tick, "生产者退出");
    Ok(())
}
