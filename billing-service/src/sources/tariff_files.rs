//! Loaders for the tariff inputs shared by a whole batch.

use std::{fs::File, path::Path};

use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use tariff_client::db::{fetch_charge_config, fetch_rate_history, fetch_tax_rows};
use tariff_client::domain::{ChargeConfig, ChargeUnit, RateHistory, TaxRow, TaxTable};

use super::csv_row::CsvRow;
use crate::config::{AppConfig, SourceConfig};
use crate::transform::TariffContext;

pub fn load_rate_history(path: &Path) -> Result<RateHistory> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rate history {}", path.display()))?;
    let history = RateHistory::from_json_str(&raw)
        .with_context(|| format!("malformed rate history {}", path.display()))?;
    tracing::info!(path = %path.display(), entries = history.len(), "loaded rate history");
    Ok(history)
}

fn read_csv<T>(path: &Path, parse: impl Fn(&CsvRow<'_>) -> Result<T>) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = result?;
        out.push(parse(&CsvRow::new(&headers, &record))?);
    }
    Ok(out)
}

/// Columns: Description, Unit, ServiceTypeId, Weighted, Prorated.
pub fn load_charge_config(path: &Path) -> Result<Vec<ChargeConfig>> {
    let charges = read_csv(path, |row| {
        let service_type_id = row.i64("ServiceTypeId")?;
        Ok(ChargeConfig {
            description: row.get("Description")?.to_string(),
            unit: ChargeUnit::parse(row.get("Unit")?),
            service_type_id: i32::try_from(service_type_id)
                .with_context(|| format!("ServiceTypeId {service_type_id} out of range"))?,
            weighted: row.flag("Weighted")?,
            prorated: row.flag("Prorated")?,
        })
    })
    .with_context(|| format!("invalid charge config {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = charges.len(), "loaded charge config");
    Ok(charges)
}

/// Columns: AccountID, DateFrom, DateTo, SalesTaxRate (percent), GRTRate.
pub fn load_tax_table(path: &Path) -> Result<TaxTable> {
    let rows = read_csv(path, |row| {
        Ok(TaxRow {
            account_id: row.i64("AccountID")?,
            date_from: row.date("DateFrom")?,
            date_to: row.date("DateTo")?,
            sales_tax_rate_pct: row.optional_f64("SalesTaxRate")?.unwrap_or(0.0),
            grt_rate: row.optional_f64("GRTRate")?.unwrap_or(0.0),
        })
    })
    .with_context(|| format!("invalid tax table {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "loaded tax table");
    Ok(rows.into_iter().collect())
}

/// Build the batch's tariff context. Configured files take precedence; the
/// database fills in whatever is left when a pool and rate id are available.
pub async fn load_tariff(cfg: &AppConfig, pool: Option<&PgPool>) -> Result<TariffContext> {
    let rate_id = match &cfg.source {
        SourceConfig::Database { rate_id, .. } => *rate_id,
        SourceConfig::Files { .. } => None,
    };

    let history = match (&cfg.inputs.rate_history, pool, rate_id) {
        (Some(path), _, _) => load_rate_history(path)?,
        (None, Some(pool), Some(rate_id)) => fetch_rate_history(pool, rate_id).await?,
        _ => bail!("no rate history source configured"),
    };
    let charges = match (&cfg.inputs.charge_config, pool, rate_id) {
        (Some(path), _, _) => load_charge_config(path)?,
        (None, Some(pool), Some(rate_id)) => fetch_charge_config(pool, rate_id).await?,
        _ => bail!("no charge config source configured"),
    };
    let taxes = match (&cfg.inputs.tax_table, pool) {
        (Some(path), _) => load_tax_table(path)?,
        (None, Some(pool)) => fetch_tax_rows(pool).await?,
        (None, None) => {
            tracing::warn!("no tax table configured, bills will be untaxed");
            TaxTable::default()
        }
    };

    if history.is_empty() {
        tracing::warn!("rate history is empty, every charge will bill at zero");
    }

    Ok(TariffContext {
        history,
        charges,
        taxes,
        filter: cfg.billing.charge_classes.filter(),
        profile: cfg.billing.tariff.clone(),
    })
}
