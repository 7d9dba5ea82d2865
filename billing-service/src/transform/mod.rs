use std::sync::Arc;

use tariff_client::domain::{ChargeConfig, DemandSample, DomainError, RateHistory, TaxTable};

use crate::bill::{assemble, Bill, BillHeader};
use crate::classify::ChargeClassFilter;
use crate::demand::demand_profile;
use crate::history::AccountBill;
use crate::pipeline::{BillKey, Envelope, PipelineError, Transform};
use crate::rates::{extract_rate_set, TariffProfile};
use crate::tax::apply_tax;

/// Everything shared by the bills of one batch. Read only.
#[derive(Debug, Clone, Default)]
pub struct TariffContext {
    pub history: RateHistory,
    pub charges: Vec<ChargeConfig>,
    pub taxes: TaxTable,
    pub filter: ChargeClassFilter,
    pub profile: TariffProfile,
}

/// One bill to compute, with the interval data of its account.
#[derive(Debug, Clone)]
pub struct BillingJob {
    pub bill: AccountBill,
    pub samples: Arc<Vec<DemandSample>>,
}

impl BillingJob {
    pub fn key(&self) -> BillKey {
        let r = &self.bill.record;
        BillKey {
            account_id: r.account_id,
            date_from: r.date_from,
            date_to: r.date_to,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BillError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{field} must be a finite, non-negative number, got {value}")]
    InvalidQuantity { field: &'static str, value: f64 },
}

fn check_quantity(field: &'static str, value: f64) -> Result<f64, BillError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(BillError::InvalidQuantity { field, value })
    }
}

/// Classify, resolve, segment, assemble and tax one bill.
pub fn compute_bill(job: &BillingJob, ctx: &TariffContext) -> Result<Bill, BillError> {
    let record = &job.bill.record;
    let window = record.window()?;
    let usage_kwh = check_quantity("usage", record.usage_kwh)?;
    let contract_demand_kw = check_quantity("contract demand", job.bill.contract_demand_kw)?;

    let rates = extract_rate_set(&ctx.history, &ctx.charges, &window, &ctx.filter, &ctx.profile);
    let profile = demand_profile(&job.samples, &window);
    if profile.ami.is_none() {
        tracing::debug!(
            account_id = record.account_id,
            date_from = %record.date_from,
            date_to = %record.date_to,
            "no interval data in window"
        );
    }

    let header = BillHeader {
        account_id: record.account_id,
        as_billed: record.bill_amount,
        load_factor: job.bill.load_factor,
    };
    let bill = assemble(header, &profile.daily, usage_kwh, &window, &rates, contract_demand_kw)
        .with_ami(profile.ami);
    Ok(apply_tax(bill, &ctx.taxes))
}

/// Runs `compute_bill` on the blocking pool.
#[derive(Clone)]
pub struct BillComputation {
    ctx: Arc<TariffContext>,
}

impl BillComputation {
    pub fn new(ctx: Arc<TariffContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl Transform<BillingJob, Bill> for BillComputation {
    async fn apply(&self, input: Envelope<BillingJob>) -> Result<Envelope<Bill>, PipelineError> {
        let key = input.payload.key();
        let ctx = self.ctx.clone();
        let job = input.payload;

        let outcome = tokio::task::spawn_blocking(move || compute_bill(&job, &ctx))
            .await
            .map_err(|e| e.to_string())
            .and_then(|res| res.map_err(|e| e.to_string()));

        match outcome {
            Ok(bill) => {
                metrics::counter!("bills_computed_total").increment(1);
                tracing::debug!(account_id = key.account_id, total = bill.total, "bill computed");
                Ok(Envelope {
                    payload: bill,
                    received_at: input.received_at,
                })
            }
            Err(reason) => {
                metrics::counter!("bills_failed_total").increment(1);
                tracing::warn!(bill = %key, error = %reason, "bill computation failed");
                Err(PipelineError::Compute { key, reason })
            }
        }
    }
}
