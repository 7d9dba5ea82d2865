use std::{fs::File, path::PathBuf};

use futures::StreamExt;
use serde::Serialize;

use crate::bill::Bill;
use crate::pipeline::{BatchReport, Envelope, PipelineError, Sink};

/// One flattened report row per bill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillReportRow {
    pub account_id: i64,
    pub date_from: String,
    pub date_to: String,
    pub billing_days: i64,
    pub usage_kwh: f64,
    pub load_factor: f64,
    pub customer_charge: f64,
    pub processing_charge: f64,
    pub contract_demand_kw: f64,
    pub contract_demand_charge: f64,
    pub demand_charge_summer: f64,
    pub demand_charge_nonsummer: f64,
    pub energy_surcharge_rate: f64,
    pub energy_surcharge: f64,
    pub ami_demand_kw: Option<f64>,
    pub ami_usage_kwh: Option<f64>,
    pub pre_tax_total: f64,
    pub total: f64,
    pub as_billed: Option<f64>,
    pub variance: Option<f64>,
    pub accuracy_pct: Option<f64>,
}

impl From<&Bill> for BillReportRow {
    fn from(bill: &Bill) -> Self {
        Self {
            account_id: bill.account_id,
            date_from: bill.date_from.to_string(),
            date_to: bill.date_to.to_string(),
            billing_days: bill.billing_days,
            usage_kwh: bill.energy_surcharge.usage_kwh,
            load_factor: bill.load_factor,
            customer_charge: bill.customer_charge.amount,
            processing_charge: bill.processing_charge.amount,
            contract_demand_kw: bill.contract_demand_charge.kw,
            contract_demand_charge: bill.contract_demand_charge.amount,
            demand_charge_summer: bill.demand_charge_summer.amount,
            demand_charge_nonsummer: bill.demand_charge_nonsummer.amount,
            energy_surcharge_rate: bill.energy_surcharge.rate_per_kwh,
            energy_surcharge: bill.energy_surcharge.amount,
            ami_demand_kw: bill.ami.as_ref().and_then(|a| a.demand_kw),
            ami_usage_kwh: bill.ami.as_ref().map(|a| a.usage_kwh),
            pre_tax_total: bill.pre_tax_total(),
            total: bill.total,
            as_billed: bill.as_billed,
            variance: bill.variance(),
            accuracy_pct: bill.accuracy_pct(),
        }
    }
}

/// Writes computed bills as a CSV report.
pub struct CsvReportSink {
    path: PathBuf,
}

impl CsvReportSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn sink_error(e: impl std::fmt::Display) -> PipelineError {
    metrics::counter!("report_sink_errors_total").increment(1);
    PipelineError::Sink(e.to_string())
}

#[async_trait::async_trait]
impl Sink<Bill> for CsvReportSink {
    async fn run<S>(&self, mut input: S) -> Result<BatchReport, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Bill>, PipelineError>> + Send + Unpin + 'static,
    {
        let file = File::create(&self.path).map_err(sink_error)?;
        let mut writer = csv::Writer::from_writer(file);
        let mut report = BatchReport::default();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for CsvReportSink");
                    report.record_failure(e);
                    continue;
                }
            };

            writer
                .serialize(BillReportRow::from(&env.payload))
                .map_err(sink_error)?;
            report.record_success();
        }

        writer.flush().map_err(sink_error)?;
        tracing::info!(
            path = %self.path.display(),
            bills = report.succeeded,
            failed = report.failed(),
            "bill report written"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::{assemble, BillHeader};
    use crate::pipeline::BillKey;
    use crate::rates::ResolvedRateSet;
    use tariff_client::domain::BillingWindow;
    use time::macros::date;

    fn bill(account_id: i64) -> Bill {
        let window = BillingWindow::new(date!(2025-04-16), date!(2025-05-15)).unwrap();
        let rates = ResolvedRateSet {
            customer_charge: Some(68.63),
            ..ResolvedRateSet::default()
        };
        assemble(
            BillHeader {
                account_id,
                as_billed: Some(70.0),
                load_factor: 0.85,
            },
            &[],
            0.0,
            &window,
            &rates,
            0.0,
        )
    }

    #[tokio::test]
    async fn writes_one_row_per_bill_and_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let failure = PipelineError::Compute {
            key: BillKey {
                account_id: 9,
                date_from: date!(2025-04-16),
                date_to: date!(2025-04-16),
            },
            reason: "empty window".to_string(),
        };
        let items = vec![
            Ok(Envelope::new(bill(1))),
            Err(failure),
            Ok(Envelope::new(bill(2))),
        ];

        let report = CsvReportSink::new(&path)
            .run(futures::stream::iter(items))
            .await
            .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures[0].key.map(|k| k.account_id), Some(9));

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[0], "account_id");
        let rows: Vec<_> = rdr.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "2025-04-16");
        let total_idx = headers.iter().position(|h| h == "total").unwrap();
        assert_eq!(&rows[1][total_idx], "68.63");
        let variance_idx = headers.iter().position(|h| h == "variance").unwrap();
        assert!(rows[1][variance_idx].starts_with("-1.37"));
        let load_factor_idx = headers.iter().position(|h| h == "load_factor").unwrap();
        assert_eq!(&rows[0][load_factor_idx], "0.85");
    }
}
