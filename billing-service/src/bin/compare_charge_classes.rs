use anyhow::{Context, Result};
use billing_service::{
    classify::{compare_mixes, ChargeClassPreset},
    config::{AppConfig, SourceConfig},
    observability,
    sources::load_charge_config,
};
use sqlx::postgres::PgPoolOptions;
use tariff_client::db::fetch_charge_config;

/// Usage: compare_charge_classes [LEFT] [RIGHT]
///
/// Prints, as JSON, which configured charges each charge class combination
/// pulls in and where the two differ.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut args = std::env::args().skip(1);
    let left: ChargeClassPreset = match args.next() {
        Some(name) => name.parse()?,
        None => ChargeClassPreset::TransmissionDelivery,
    };
    let right: ChargeClassPreset = match args.next() {
        Some(name) => name.parse()?,
        None => ChargeClassPreset::TransmissionSupply,
    };

    let cfg = AppConfig::load()?;
    let charges = match (&cfg.inputs.charge_config, &cfg.source, &cfg.database) {
        (Some(path), _, _) => load_charge_config(path)?,
        (None, SourceConfig::Database { rate_id: Some(rate_id), .. }, Some(db)) => {
            let pool = PgPoolOptions::new()
                .max_connections(db.max_connections)
                .connect(&db.uri)
                .await?;
            fetch_charge_config(&pool, *rate_id).await?
        }
        _ => anyhow::bail!("no charge config configured"),
    };

    let comparison = compare_mixes(&charges, left, right);
    tracing::info!(
        left = %left,
        right = %right,
        only_left = comparison.only_left.len(),
        only_right = comparison.only_right.len(),
        "charge class comparison"
    );
    let json = serde_json::to_string_pretty(&comparison).context("failed to encode comparison")?;
    println!("{json}");

    Ok(())
}
