use serde::Serialize;

use super::DomainError;

/// Charge class a tariff line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ServiceType {
    Transmission,
    Supply,
    Delivery,
}

impl ServiceType {
    pub fn id(self) -> i32 {
        match self {
            Self::Transmission => 0,
            Self::Supply => 1,
            Self::Delivery => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Transmission),
            1 => Some(Self::Supply),
            2 => Some(Self::Delivery),
            _ => None,
        }
    }
}

/// Billing determinant of a charge line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChargeUnit {
    Kwh,
    Kw,
    PerMonth,
    Other(String),
}

impl ChargeUnit {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "kWh" => Self::Kwh,
            "kW" => Self::Kw,
            "per month" => Self::PerMonth,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Static descriptor of one tariff charge line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeConfig {
    /// Join key into the rate history (case-insensitive substring match).
    pub description: String,
    pub unit: ChargeUnit,
    pub service_type_id: i32,
    pub weighted: bool,
    pub prorated: bool,
}

impl ChargeConfig {
    pub fn new(description: impl Into<String>, unit: ChargeUnit, service_type: ServiceType) -> Self {
        Self {
            description: description.into(),
            unit,
            service_type_id: service_type.id(),
            weighted: false,
            prorated: false,
        }
    }

    pub fn weighted(mut self) -> Self {
        self.weighted = true;
        self
    }

    pub fn prorated(mut self) -> Self {
        self.prorated = true;
        self
    }
}

/// Parse a boolean column the way spreadsheets and SQL exports write them.
/// Blank cells read as `false`.
pub fn parse_flag(value: &str) -> Result<bool, DomainError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "f" | "no" | "n" => Ok(false),
        "1" | "true" | "t" | "yes" | "y" => Ok(true),
        _ => Err(DomainError::InvalidFlag(value.to_string())),
    }
}
