use time::{Duration, PrimitiveDateTime};

/// Usage unit of interval readings that count toward demand.
pub const KWH_UNIT: &str = "KWH";

/// One interval (AMI) reading.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DemandSample {
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
    pub usage_kwh: f64,
    pub usage_unit: String,
}

impl DemandSample {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Only 5-minute kWh readings feed demand aggregation.
    pub fn is_demand_interval(&self) -> bool {
        self.duration() == Duration::minutes(5) && self.usage_unit == KWH_UNIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample(end: PrimitiveDateTime, unit: &str) -> DemandSample {
        DemandSample {
            start: datetime!(2025-07-01 08:00:00),
            end,
            usage_kwh: 1.0,
            usage_unit: unit.to_string(),
        }
    }

    #[test]
    fn demand_interval_requires_five_minutes_and_kwh() {
        assert!(sample(datetime!(2025-07-01 08:05:00), "KWH").is_demand_interval());
        assert!(!sample(datetime!(2025-07-01 08:15:00), "KWH").is_demand_interval());
        assert!(!sample(datetime!(2025-07-01 08:05:00), "KVARH").is_demand_interval());
        assert!(!sample(datetime!(2025-07-01 08:05:00), "kwh").is_demand_interval());
    }
}
