mod billing;
mod charge_config;
pub mod dates;
mod error;
mod interval;
mod rate_entry;
mod tax;

pub use billing::{BillingRecord, BillingWindow};
pub use charge_config::{parse_flag, ChargeConfig, ChargeUnit, ServiceType};
pub use error::DomainError;
pub use interval::{DemandSample, KWH_UNIT};
pub use rate_entry::{RateEntry, RateHistory, RateTable};
pub use tax::{TaxRow, TaxTable};
