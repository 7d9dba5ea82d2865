pub mod billing_queries;

pub use billing_queries::{
    fetch_bills, fetch_charge_config, fetch_interval_samples, fetch_rate_history, fetch_tax_rows,
};
