use anyhow::{anyhow, Result};
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::domain::{
    BillingRecord, ChargeConfig, ChargeUnit, DemandSample, RateHistory, TaxRow, TaxTable,
};

/// Fetch the non-revised bills of one account, oldest first.
pub async fn fetch_bills(pool: &PgPool, account_id: i64) -> Result<Vec<BillingRecord>> {
    let rows = sqlx::query_as::<_, BillingRecord>(
        r#"
        SELECT DISTINCT
            account_id,
            date_from,
            date_to,
            usage       AS usage_kwh,
            demand      AS demand_kw,
            bill_amount
        FROM billing_details
        WHERE account_id = $1
          AND revised = FALSE
        ORDER BY date_to
        "#,
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch interval readings for one account whose start falls in `[start, end)`.
pub async fn fetch_interval_samples(
    pool: &PgPool,
    account_id: i64,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Result<Vec<DemandSample>> {
    let rows = sqlx::query_as::<_, DemandSample>(
        r#"
        SELECT
            start_ts    AS start,
            end_ts      AS "end",
            usage       AS usage_kwh,
            usage_unit
        FROM interval_readings
        WHERE account_id = $1
          AND start_ts >= $2
          AND start_ts <  $3
        ORDER BY start_ts
        "#,
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[derive(Debug, sqlx::FromRow)]
struct ChargeConfigRow {
    description: String,
    unit: String,
    service_type_id: i32,
    weighted: bool,
    prorated: bool,
}

impl From<ChargeConfigRow> for ChargeConfig {
    fn from(r: ChargeConfigRow) -> Self {
        ChargeConfig {
            description: r.description,
            unit: ChargeUnit::parse(&r.unit),
            service_type_id: r.service_type_id,
            weighted: r.weighted,
            prorated: r.prorated,
        }
    }
}

/// Fetch the charge lines configured for a rate. Average supply charges are
/// informational and never billed directly, so they are left out.
pub async fn fetch_charge_config(pool: &PgPool, rate_id: i32) -> Result<Vec<ChargeConfig>> {
    let rows = sqlx::query_as::<_, ChargeConfigRow>(
        r#"
        SELECT
            charge_description  AS description,
            charge_determinant  AS unit,
            service_type_id,
            weighted_average    AS weighted,
            prorated
        FROM charge_configuration
        WHERE rate_id = $1
          AND charge_description NOT LIKE '%Average Supply Charge%'
          AND charge_type_id IN (0, 2)
        ORDER BY id
        "#,
    )
    .bind(rate_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ChargeConfig::from).collect())
}

/// Fetch the most recent rate history document for a rate.
pub async fn fetch_rate_history(pool: &PgPool, rate_id: i32) -> Result<RateHistory> {
    let doc: Option<String> = sqlx::query_scalar(
        r#"
        SELECT rate_history
        FROM rate_history
        WHERE rate_id = $1
        ORDER BY effective_date DESC
        LIMIT 1
        "#,
    )
    .bind(rate_id)
    .fetch_optional(pool)
    .await?;

    let doc = doc.ok_or_else(|| anyhow!("no rate history stored for rate {rate_id}"))?;
    Ok(RateHistory::from_json_str(&doc)?)
}

pub async fn fetch_tax_rows(pool: &PgPool) -> Result<TaxTable> {
    let rows = sqlx::query_as::<_, TaxRow>(
        r#"
        SELECT
            account_id,
            date_from,
            date_to,
            sales_tax_rate AS sales_tax_rate_pct,
            grt_rate
        FROM sales_grt_tax
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}
