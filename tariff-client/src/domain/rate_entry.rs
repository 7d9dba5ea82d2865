use std::collections::BTreeMap;

use serde_json::{Map, Value};
use time::Date;

use super::{dates, DomainError};

/// The rate tables a tariff history is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RateTable {
    Energy,
    Demand,
    ServiceCharge,
    OtherCharges,
    DemandTime,
}

impl RateTable {
    pub const ALL: [RateTable; 5] = [
        Self::Energy,
        Self::Demand,
        Self::ServiceCharge,
        Self::OtherCharges,
        Self::DemandTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Energy => "Energy_Table",
            Self::Demand => "Demand_Table",
            Self::ServiceCharge => "ServiceCharge_Table",
            Self::OtherCharges => "OtherCharges_Table",
            Self::DemandTime => "DemandTime_Table",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

const DESCRIPTION: &str = "Description";
const EFFECTIVE_DATE: &str = "EffectiveDate";
const SEASON: &str = "Season";
const START_TIME: &str = "StartTime";
const END_TIME: &str = "EndTime";

/// One effective-dated version of a charge line.
///
/// `sequence` is the position of the entry in its source document and breaks
/// ties between entries sharing an effective date: the later entry wins.
#[derive(Debug, Clone, PartialEq)]
pub struct RateEntry {
    pub description: String,
    pub effective_date: Date,
    pub sequence: u64,
    pub season: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Numeric fields by column name (`RatekWh`, `RatekW`, `Rate`, ...).
    pub rates: BTreeMap<String, f64>,
}

impl RateEntry {
    pub fn new(description: impl Into<String>, effective_date: Date) -> Self {
        Self {
            description: description.into(),
            effective_date,
            sequence: 0,
            season: None,
            start_time: None,
            end_time: None,
            rates: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, field: impl Into<String>, value: f64) -> Self {
        self.rates.insert(field.into(), value);
        self
    }

    pub fn with_time_window(
        mut self,
        season: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        self.season = Some(season.into());
        self.start_time = Some(start_time.into());
        self.end_time = Some(end_time.into());
        self
    }

    pub fn rate(&self, field: &str) -> Option<f64> {
        self.rates.get(field).copied()
    }

    /// Case-insensitive substring match of `needle` against the description.
    pub fn matches_description(&self, needle: &str) -> bool {
        self.description
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }

    fn from_json(
        table: RateTable,
        obj: &Map<String, Value>,
        sequence: u64,
    ) -> Result<Self, DomainError> {
        let description = obj
            .get(DESCRIPTION)
            .and_then(Value::as_str)
            .ok_or(DomainError::MissingField {
                table: table.name(),
                field: DESCRIPTION,
            })?
            .to_string();
        let effective_date = obj
            .get(EFFECTIVE_DATE)
            .and_then(Value::as_str)
            .ok_or(DomainError::MissingField {
                table: table.name(),
                field: EFFECTIVE_DATE,
            })
            .and_then(dates::parse_date)?;

        let rates = obj
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    DESCRIPTION | EFFECTIVE_DATE | SEASON | START_TIME | END_TIME
                )
            })
            .filter_map(|(k, v)| value_as_f64(v).map(|n| (k.clone(), n)))
            .collect();

        Ok(Self {
            description,
            effective_date,
            sequence,
            season: obj.get(SEASON).and_then(value_as_text),
            start_time: obj.get(START_TIME).and_then(value_as_text),
            end_time: obj.get(END_TIME).and_then(value_as_text),
            rates,
        })
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Time-of-day columns arrive as `"800"` or `800`; both normalize to `"800"`.
fn value_as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        _ => None,
    }
}

/// Every rate table of a tariff, entries kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateHistory {
    tables: BTreeMap<RateTable, Vec<RateEntry>>,
    next_sequence: u64,
}

impl RateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, stamping it with the next sequence number.
    pub fn insert(&mut self, table: RateTable, mut entry: RateEntry) {
        entry.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tables.entry(table).or_default().push(entry);
    }

    pub fn with_entry(mut self, table: RateTable, entry: RateEntry) -> Self {
        self.insert(table, entry);
        self
    }

    pub fn table(&self, table: RateTable) -> &[RateEntry] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_json_str(s: &str) -> Result<Self, DomainError> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| DomainError::MalformedHistory(e.to_string()))?;
        Self::from_json_value(&value)
    }

    /// Build from `{ "<table name>": [entry, ...], ... }`. A top-level array is
    /// accepted too, in which case its first element holds the tables.
    /// Unknown table names are skipped.
    pub fn from_json_value(value: &Value) -> Result<Self, DomainError> {
        let root = match value {
            Value::Array(items) => items.first().ok_or_else(|| {
                DomainError::MalformedHistory("empty rate history array".to_string())
            })?,
            other => other,
        };
        let tables = root.as_object().ok_or_else(|| {
            DomainError::MalformedHistory("rate history must be an object of tables".to_string())
        })?;

        let mut history = Self::new();
        for (name, entries) in tables {
            let Some(table) = RateTable::from_name(name) else {
                continue;
            };
            let entries = entries.as_array().ok_or_else(|| {
                DomainError::MalformedHistory(format!("{name} must be an array"))
            })?;
            for entry in entries {
                let obj = entry.as_object().ok_or_else(|| {
                    DomainError::MalformedHistory(format!("{name} entries must be objects"))
                })?;
                let parsed = RateEntry::from_json(table, obj, history.next_sequence)?;
                history.insert(table, parsed);
            }
        }
        Ok(history)
    }
}
