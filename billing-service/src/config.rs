use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::classify::ChargeClassPreset;
use crate::rates::TariffProfile;

fn default_workers() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub charge_classes: ChargeClassPreset,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub tariff: TariffProfile,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            charge_classes: ChargeClassPreset::default(),
            workers: default_workers(),
            tariff: TariffProfile::default(),
        }
    }
}

/// Tariff input files. With a database source, any file left unset is
/// fetched from the database instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputsConfig {
    pub rate_history: Option<PathBuf>,
    pub charge_config: Option<PathBuf>,
    pub tax_table: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Files {
        billing_records: PathBuf,
        interval_data: Option<PathBuf>,
    },
    Database {
        account_ids: Vec<i64>,
        rate_id: Option<i32>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Csv,
    Ndjson,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus textfile written at the end of a batch.
    pub textfile_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub inputs: InputsConfig,
    pub source: SourceConfig,
    pub database: Option<DatabaseConfig>,
    pub sink: SinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BILLING_CONFIG").unwrap_or_else(|_| "billing-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        match &self.source {
            SourceConfig::Files { .. } => {
                if self.inputs.rate_history.is_none() || self.inputs.charge_config.is_none() {
                    anyhow::bail!("files source needs inputs.rate_history and inputs.charge_config");
                }
            }
            SourceConfig::Database { rate_id, .. } => {
                if self.database.is_none() {
                    anyhow::bail!("database source needs a [database] section");
                }
                let needs_rate_id =
                    self.inputs.rate_history.is_none() || self.inputs.charge_config.is_none();
                if needs_rate_id && rate_id.is_none() {
                    anyhow::bail!("source.rate_id is required when tariff files are not configured");
                }
            }
        }
        if self.billing.workers == 0 {
            anyhow::bail!("billing.workers must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILES: &str = r#"
        [billing]
        charge_classes = "transmission_supply"
        workers = 8

        [billing.tariff]
        summer_season = "Summer"

        [inputs]
        rate_history = "rates.json"
        charge_config = "charges.csv"

        [source]
        kind = "files"
        billing_records = "bills.csv"

        [sink]
        kind = "ndjson"
        path = "bills.ndjson"
    "#;

    #[test]
    fn parses_files_config_with_defaults() {
        let cfg = AppConfig::from_toml_str(FILES).unwrap();
        assert_eq!(cfg.billing.charge_classes, ChargeClassPreset::TransmissionSupply);
        assert_eq!(cfg.billing.workers, 8);
        assert_eq!(cfg.billing.tariff.summer_season, "Summer");
        assert_eq!(
            cfg.billing.tariff.contract_demand_description,
            TariffProfile::default().contract_demand_description
        );
        assert_eq!(cfg.sink.kind, SinkKind::Ndjson);
        assert!(cfg.inputs.tax_table.is_none());
        assert!(cfg.metrics.textfile_path.is_none());
        assert!(matches!(
            cfg.source,
            SourceConfig::Files { interval_data: None, .. }
        ));
    }

    #[test]
    fn database_source_needs_rate_id_or_files() {
        let without = r#"
            [source]
            kind = "database"
            account_ids = [1, 2]

            [database]
            uri = "postgres://localhost/billing"
            max_connections = 4

            [sink]
            kind = "csv"
            path = "bills.csv"
        "#;
        assert!(AppConfig::from_toml_str(without).is_err());

        let with = without.replace("account_ids = [1, 2]", "account_ids = [1, 2]\nrate_id = 12");
        let cfg = AppConfig::from_toml_str(&with).unwrap();
        assert_eq!(cfg.billing.workers, 4);
        assert!(matches!(cfg.source, SourceConfig::Database { rate_id: Some(12), .. }));
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let bad = FILES.replace("transmission_supply", "everything");
        assert!(AppConfig::from_toml_str(&bad).is_err());
    }
}
