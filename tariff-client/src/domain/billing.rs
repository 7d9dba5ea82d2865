use serde::Serialize;
use time::Date;

use super::{dates, DomainError};

/// Fixed month length used to normalize prorated monthly rates.
const PRORATION_MONTH_DAYS: f64 = 30.0;

/// A billing period. `end` is strictly after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BillingWindow {
    #[serde(serialize_with = "dates::serialize_date")]
    start: Date,
    #[serde(serialize_with = "dates::serialize_date")]
    end: Date,
}

impl BillingWindow {
    pub fn new(start: Date, end: Date) -> Result<Self, DomainError> {
        if end <= start {
            return Err(DomainError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    /// Whole days between start and end. Always positive.
    pub fn billing_days(&self) -> i64 {
        (self.end - self.start).whole_days()
    }

    /// `billing_days / 30`, not calendar aware.
    pub fn month_fraction(&self) -> f64 {
        self.billing_days() as f64 / PRORATION_MONTH_DAYS
    }
}

/// One utility bill as recorded by the billing system.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BillingRecord {
    pub account_id: i64,
    #[serde(serialize_with = "dates::serialize_date")]
    pub date_from: Date,
    #[serde(serialize_with = "dates::serialize_date")]
    pub date_to: Date,
    pub usage_kwh: f64,
    pub demand_kw: f64,
    /// Amount actually billed, kept for variance reporting.
    pub bill_amount: Option<f64>,
}

impl BillingRecord {
    pub fn window(&self) -> Result<BillingWindow, DomainError> {
        BillingWindow::new(self.date_from, self.date_to)
    }

    pub fn billing_days(&self) -> i64 {
        (self.date_to - self.date_from).whole_days()
    }
}
