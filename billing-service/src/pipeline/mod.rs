use std::{fmt, pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use serde::Serialize;
use tariff_client::domain::dates;
use time::Date;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

/// Identifies one bill in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BillKey {
    pub account_id: i64,
    #[serde(serialize_with = "dates::serialize_date")]
    pub date_from: Date,
    #[serde(serialize_with = "dates::serialize_date")]
    pub date_to: Date,
}

impl fmt::Display for BillKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account {} [{} .. {}]", self.account_id, self.date_from, self.date_to)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("bill {key} failed: {reason}")]
    Compute { key: BillKey, reason: String },
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    /// Consume the stream, recording upstream errors as failures. Only a sink
    /// error of its own ends the run early.
    async fn run<S>(&self, input: S) -> Result<BatchReport, PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// A unit of work that did not produce a bill.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillFailure {
    /// `None` when the input row could not be read far enough to identify it.
    pub key: Option<BillKey>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failures: Vec<BillFailure>,
}

impl BatchReport {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, err: PipelineError) {
        let failure = match err {
            PipelineError::Compute { key, reason } => BillFailure {
                key: Some(key),
                reason,
            },
            other => BillFailure {
                key: None,
                reason: other.to_string(),
            },
        };
        self.failures.push(failure);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

pub struct Pipeline<S, I, O, K> {
    pub source: S,
    pub transform: Arc<dyn Transform<I, O>>,
    pub sink: K,
    /// Units of work in flight at once. Results reach the sink in source
    /// order.
    pub concurrency: usize,
}

impl<S, I, O, K> Pipeline<S, I, O, K>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Source<I> + Send + Sync + 'static,
    K: Sink<O> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<BatchReport, PipelineError> {
        let input = self.source.stream().await;
        let transform = self.transform;

        let output = input
            .map(move |item| {
                let t = transform.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            })
            .buffered(self.concurrency.max(1));

        self.sink.run(Box::pin(output)).await
    }
}
