use anyhow::Result;
use billing_service::{
    bill::Bill,
    config::{AppConfig, SinkKind, SourceConfig},
    metrics_export, observability,
    pipeline::{BatchReport, Envelope, EnvelopeStream, Pipeline, PipelineError, Sink, Source},
    sinks::{CsvReportSink, NdjsonSink},
    sources::{tariff_files::load_tariff, BillingFilesSource, DatabaseSource},
    transform::{BillComputation, BillingJob},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

enum BillSource {
    Files(BillingFilesSource),
    Database(DatabaseSource),
}

#[async_trait::async_trait]
impl Source<BillingJob> for BillSource {
    async fn stream(&self) -> EnvelopeStream<BillingJob> {
        match self {
            Self::Files(s) => s.stream().await,
            Self::Database(s) => s.stream().await,
        }
    }
}

enum BillSink {
    Csv(CsvReportSink),
    Ndjson(NdjsonSink),
}

#[async_trait::async_trait]
impl Sink<Bill> for BillSink {
    async fn run<S>(&self, input: S) -> Result<BatchReport, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Bill>, PipelineError>> + Send + Unpin + 'static,
    {
        match self {
            Self::Csv(s) => s.run(input).await,
            Self::Ndjson(s) => s.run(input).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    metrics_export::init()?;

    // Only the database source needs a pool.
    let pool = match (&cfg.source, &cfg.database) {
        (SourceConfig::Database { .. }, Some(db)) => Some(
            PgPoolOptions::new()
                .max_connections(db.max_connections)
                .connect(&db.uri)
                .await?,
        ),
        _ => None,
    };

    let ctx = Arc::new(load_tariff(&cfg, pool.as_ref()).await?);
    tracing::info!(
        charge_classes = %cfg.billing.charge_classes,
        charges = ctx.charges.len(),
        rate_entries = ctx.history.len(),
        tax_rows = ctx.taxes.len(),
        "tariff loaded"
    );

    let source = match (&cfg.source, pool) {
        (
            SourceConfig::Files {
                billing_records,
                interval_data,
            },
            _,
        ) => BillSource::Files(BillingFilesSource::new(
            billing_records.clone(),
            interval_data.clone(),
        )),
        (SourceConfig::Database { account_ids, .. }, Some(pool)) => {
            BillSource::Database(DatabaseSource::new(pool, account_ids.clone()))
        }
        (SourceConfig::Database { .. }, None) => {
            anyhow::bail!("database source configured without a [database] section")
        }
    };

    let sink = match cfg.sink.kind {
        SinkKind::Csv => BillSink::Csv(CsvReportSink::new(cfg.sink.path.clone())),
        SinkKind::Ndjson => BillSink::Ndjson(NdjsonSink::new(cfg.sink.path.clone())),
    };

    let pipeline: Pipeline<_, BillingJob, Bill, _> = Pipeline {
        source,
        transform: Arc::new(BillComputation::new(ctx)),
        sink,
        concurrency: cfg.billing.workers,
    };
    let report = pipeline.run().await?;

    for failure in &report.failures {
        match &failure.key {
            Some(key) => tracing::warn!(bill = %key, reason = %failure.reason, "bill not computed"),
            None => tracing::warn!(reason = %failure.reason, "input row skipped"),
        }
    }
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed(),
        "billing batch finished"
    );

    if let Some(path) = &cfg.metrics.textfile_path {
        metrics_export::write_textfile(path)?;
    }

    Ok(())
}
