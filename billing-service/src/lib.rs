pub mod bill;
pub mod classify;
pub mod config;
pub mod demand;
pub mod history;
pub mod metrics_export;
pub mod observability;
pub mod pipeline;
pub mod rates;
pub mod sinks;
pub mod sources;
pub mod tax;
pub mod transform;

pub use bill::Bill;
pub use pipeline::{BatchReport, Envelope, Pipeline};
pub use transform::{compute_bill, BillError, BillingJob, TariffContext};
