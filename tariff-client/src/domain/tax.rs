use time::Date;

/// Sales tax and gross receipts tax for one bill.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaxRow {
    pub account_id: i64,
    pub date_from: Date,
    pub date_to: Date,
    /// Percentage, e.g. `8.875`.
    pub sales_tax_rate_pct: f64,
    /// Fraction, e.g. `0.0251`.
    pub grt_rate: f64,
}

impl TaxRow {
    pub fn sales_tax_fraction(&self) -> f64 {
        self.sales_tax_rate_pct / 100.0
    }

    pub fn matches(&self, account_id: i64, date_from: Date, date_to: Date) -> bool {
        self.account_id == account_id && self.date_from == date_from && self.date_to == date_to
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxTable {
    rows: Vec<TaxRow>,
}

impl TaxTable {
    pub fn new(rows: Vec<TaxRow>) -> Self {
        Self { rows }
    }

    /// First row keyed exactly by (account, from, to).
    pub fn find(&self, account_id: i64, date_from: Date, date_to: Date) -> Option<&TaxRow> {
        self.rows
            .iter()
            .find(|r| r.matches(account_id, date_from, date_to))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<TaxRow> for TaxTable {
    fn from_iter<I: IntoIterator<Item = TaxRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
