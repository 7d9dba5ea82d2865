use std::path::PathBuf;

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::bill::Bill;
use crate::pipeline::{BatchReport, Envelope, PipelineError, Sink};

/// Writes each itemized bill as one JSON line.
pub struct NdjsonSink {
    path: PathBuf,
}

impl NdjsonSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn sink_error(e: impl std::fmt::Display) -> PipelineError {
    metrics::counter!("report_sink_errors_total").increment(1);
    PipelineError::Sink(e.to_string())
}

#[async_trait::async_trait]
impl Sink<Bill> for NdjsonSink {
    async fn run<S>(&self, mut input: S) -> Result<BatchReport, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Bill>, PipelineError>> + Send + Unpin + 'static,
    {
        let file = tokio::fs::File::create(&self.path).await.map_err(sink_error)?;
        let mut writer = BufWriter::new(file);
        let mut report = BatchReport::default();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for NdjsonSink");
                    report.record_failure(e);
                    continue;
                }
            };

            let mut line = serde_json::to_vec(&env.payload).map_err(sink_error)?;
            line.push(b'\n');
            writer.write_all(&line).await.map_err(sink_error)?;
            report.record_success();
        }

        writer.flush().await.map_err(sink_error)?;
        tracing::info!(
            path = %self.path.display(),
            bills = report.succeeded,
            failed = report.failed(),
            "bills written"
        );
        Ok(report)
    }
}
