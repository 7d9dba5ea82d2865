use std::sync::Arc;

use sqlx::PgPool;
use tariff_client::db::{fetch_bills, fetch_interval_samples};
use time::{Duration, Time};

use crate::history::annotate_history;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};
use crate::transform::BillingJob;

/// Bills and interval readings fetched per account from Postgres.
///
/// An account whose queries fail is reported as a source error and the
/// remaining accounts still run.
pub struct DatabaseSource {
    pool: PgPool,
    account_ids: Vec<i64>,
}

impl DatabaseSource {
    pub fn new(pool: PgPool, account_ids: Vec<i64>) -> Self {
        Self { pool, account_ids }
    }
}

async fn account_jobs(pool: &PgPool, account_id: i64) -> anyhow::Result<Vec<BillingJob>> {
    let records = fetch_bills(pool, account_id).await?;
    let (Some(first), Some(last)) = (
        records.iter().map(|r| r.date_from).min(),
        records.iter().map(|r| r.date_to).max(),
    ) else {
        tracing::warn!(account_id, "account has no bills");
        return Ok(Vec::new());
    };

    let start = first.with_time(Time::MIDNIGHT);
    let end = (last + Duration::days(1)).with_time(Time::MIDNIGHT);
    let samples = Arc::new(fetch_interval_samples(pool, account_id, start, end).await?);
    tracing::info!(
        account_id,
        bills = records.len(),
        samples = samples.len(),
        "fetched account history"
    );

    Ok(annotate_history(records)
        .into_iter()
        .map(|bill| BillingJob {
            bill,
            samples: samples.clone(),
        })
        .collect())
}

#[async_trait::async_trait]
impl Source<BillingJob> for DatabaseSource {
    async fn stream(&self) -> EnvelopeStream<BillingJob> {
        let pool = self.pool.clone();
        let account_ids = self.account_ids.clone();

        let s = async_stream::stream! {
            for account_id in account_ids {
                match account_jobs(&pool, account_id).await {
                    Ok(jobs) => {
                        for job in jobs {
                            yield Ok(Envelope::new(job));
                        }
                    }
                    Err(e) => {
                        tracing::error!(account_id, error = %e, "failed to fetch account");
                        yield Err(PipelineError::Source(format!("account {account_id}: {e:#}")));
                    }
                }
            }
        };

        Box::pin(s)
    }
}
