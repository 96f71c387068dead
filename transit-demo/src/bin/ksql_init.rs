use tracing::info;
use transit::{TransitError, domain::Config};
use transit_kafka::{KafkaAdmin, KafkaConfig, KsqlClient, Statement, Submission};

#[tokio::main]
async fn main() -> Result<(), TransitError> {
    let _guard = transit_demo::init_logging();
    let cfg = KafkaConfig::get()?;
    let admin = KafkaAdmin::new(&cfg)?;
    let client = KsqlClient::new(&cfg.ksql_url, cfg.timeout)?;

    match client
        .execute(&admin, &Statement::turnstile_summary())
        .await?
    {
        Submission::Skipped => info!("汇总表已存在"),
        Submission::Submitted => info!("完成汇总表创建"),
    }
    Ok(())
}
