use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use csv::StringRecord;
use tariff_client::domain::{BillingRecord, DemandSample};

use super::csv_row::CsvRow;
use crate::history::annotate_accounts;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};
use crate::transform::BillingJob;

/// Billing records and interval readings read from CSV exports.
///
/// Billing columns: AccountID, DateFrom, DateTo, Usage, Demand, BillAmount
/// (optional). Interval columns: AccountID, StartDate, EndDate, Usage,
/// UsageUnit.
///
/// Rows that fail to parse are reported downstream as source errors; the
/// remaining rows still produce jobs.
pub struct BillingFilesSource {
    billing_records: PathBuf,
    interval_data: Option<PathBuf>,
}

impl BillingFilesSource {
    pub fn new<P: Into<PathBuf>>(billing_records: P, interval_data: Option<PathBuf>) -> Self {
        Self {
            billing_records: billing_records.into(),
            interval_data,
        }
    }
}

fn open_csv(path: &Path) -> Result<(csv::Reader<File>, StringRecord), PipelineError> {
    let file = File::open(path).map_err(|e| {
        PipelineError::Source(format!("failed to open {}: {e}", path.display()))
    })?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr
        .headers()
        .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
        .clone();
    Ok((rdr, headers))
}

fn record_to_billing(row: &CsvRow<'_>) -> Result<BillingRecord, PipelineError> {
    Ok(BillingRecord {
        account_id: row.i64("AccountID")?,
        date_from: row.date("DateFrom")?,
        date_to: row.date("DateTo")?,
        usage_kwh: row.f64("Usage")?,
        demand_kw: row.f64("Demand")?,
        bill_amount: row.optional_f64("BillAmount")?,
    })
}

fn record_to_sample(row: &CsvRow<'_>) -> Result<(i64, DemandSample), PipelineError> {
    let sample = DemandSample {
        start: row.timestamp("StartDate")?,
        end: row.timestamp("EndDate")?,
        usage_kwh: row.f64("Usage")?,
        usage_unit: row.get("UsageUnit")?.to_string(),
    };
    Ok((row.i64("AccountID")?, sample))
}

/// Parse every row, collecting good rows and per-row errors separately.
fn read_rows<T>(
    path: &Path,
    parse: impl Fn(&CsvRow<'_>) -> Result<T, PipelineError>,
) -> Result<(Vec<T>, Vec<PipelineError>), PipelineError> {
    let (mut rdr, headers) = open_csv(path)?;
    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for result in rdr.records() {
        let parsed = result
            .map_err(|e| PipelineError::Source(format!("failed to read CSV record: {e}")))
            .and_then(|record| parse(&CsvRow::new(&headers, &record)));
        match parsed {
            Ok(row) => rows.push(row),
            Err(e) => {
                metrics::counter!("billing_csv_parse_errors_total").increment(1);
                errors.push(e);
            }
        }
    }

    Ok((rows, errors))
}

#[async_trait::async_trait]
impl Source<BillingJob> for BillingFilesSource {
    async fn stream(&self) -> EnvelopeStream<BillingJob> {
        let billing_path = self.billing_records.clone();
        let interval_path = self.interval_data.clone();

        let s = async_stream::stream! {
            let (records, errors) = match read_rows(&billing_path, record_to_billing) {
                Ok(parsed) => parsed,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for e in errors {
                yield Err(e);
            }

            let mut samples_by_account: HashMap<i64, Vec<DemandSample>> = HashMap::new();
            if let Some(path) = interval_path {
                match read_rows(&path, record_to_sample) {
                    Ok((samples, errors)) => {
                        for (account_id, sample) in samples {
                            samples_by_account.entry(account_id).or_default().push(sample);
                        }
                        for e in errors {
                            yield Err(e);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                    }
                }
            }
            let samples_by_account: HashMap<i64, Arc<Vec<DemandSample>>> = samples_by_account
                .into_iter()
                .map(|(account_id, samples)| (account_id, Arc::new(samples)))
                .collect();

            for bill in annotate_accounts(records) {
                let samples = samples_by_account
                    .get(&bill.record.account_id)
                    .cloned()
                    .unwrap_or_default();
                yield Ok(Envelope::new(BillingJob { bill, samples }));
            }
        };

        Box::pin(s)
    }
}
