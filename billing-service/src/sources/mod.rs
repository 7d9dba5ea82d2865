mod csv_row;

pub mod billing_files;
pub mod database;
pub mod tariff_files;

pub use billing_files::BillingFilesSource;
pub use database::DatabaseSource;
pub use tariff_files::{load_charge_config, load_rate_history, load_tax_table};
