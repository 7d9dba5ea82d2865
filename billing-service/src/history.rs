//! Per-account bill history: contract demand and load factor.

use std::collections::BTreeMap;

use serde::Serialize;
use tariff_client::domain::BillingRecord;

use crate::rates::round_to;

/// Bills looked back over when deriving contract demand, current one included.
pub const CONTRACT_DEMAND_WINDOW: usize = 24;

/// A billing record with the figures derived from the bills before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBill {
    #[serde(flatten)]
    pub record: BillingRecord,
    pub contract_demand_kw: f64,
    pub load_factor: f64,
}

/// `usage / (demand × hours in the period)`, two decimals. Zero without demand.
pub fn load_factor(record: &BillingRecord) -> f64 {
    let hours = record.billing_days() as f64 * 24.0;
    let denominator = record.demand_kw * hours;
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    round_to(record.usage_kwh / denominator, 2)
}

/// Annotate one account's bills. Output is sorted by `date_to`.
pub fn annotate_history(mut records: Vec<BillingRecord>) -> Vec<AccountBill> {
    records.sort_by_key(|r| r.date_to);

    let demands: Vec<f64> = records.iter().map(|r| r.demand_kw).collect();
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let from = (i + 1).saturating_sub(CONTRACT_DEMAND_WINDOW);
            let contract_demand_kw = demands[from..=i].iter().copied().fold(f64::MIN, f64::max);
            let load_factor = load_factor(&record);
            AccountBill {
                record,
                contract_demand_kw,
                load_factor,
            }
        })
        .collect()
}

/// Group mixed-account records and annotate each account independently.
pub fn annotate_accounts(records: Vec<BillingRecord>) -> Vec<AccountBill> {
    let mut by_account: BTreeMap<i64, Vec<BillingRecord>> = BTreeMap::new();
    for record in records {
        by_account.entry(record.account_id).or_default().push(record);
    }
    by_account
        .into_values()
        .flat_map(annotate_history)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::date, Date, Duration};

    fn record(account_id: i64, date_to: Date, demand_kw: f64) -> BillingRecord {
        BillingRecord {
            account_id,
            date_from: date_to - Duration::days(30),
            date_to,
            usage_kwh: 72_000.0,
            demand_kw,
            bill_amount: None,
        }
    }

    #[test]
    fn contract_demand_is_running_max_over_window() {
        let start = date!(2020-01-31);
        let demands = [100.0, 300.0, 200.0];
        let mut records: Vec<BillingRecord> = demands
            .iter()
            .enumerate()
            .map(|(i, d)| record(1, start + Duration::days(31 * i as i64), *d))
            .collect();
        records.reverse();

        let annotated = annotate_history(records);
        let contract: Vec<f64> = annotated.iter().map(|b| b.contract_demand_kw).collect();
        assert_eq!(contract, vec![100.0, 300.0, 300.0]);
        assert!(annotated.windows(2).all(|w| w[0].record.date_to < w[1].record.date_to));
    }

    #[test]
    fn old_peaks_roll_out_after_24_bills() {
        let start = date!(2020-01-31);
        let records: Vec<BillingRecord> = (0..26)
            .map(|i| {
                let demand = if i == 0 { 900.0 } else { 100.0 };
                record(1, start + Duration::days(31 * i), demand)
            })
            .collect();

        let annotated = annotate_history(records);
        assert_eq!(annotated[23].contract_demand_kw, 900.0);
        assert_eq!(annotated[24].contract_demand_kw, 100.0);
    }

    #[test]
    fn load_factor_uses_billing_hours() {
        let r = record(1, date!(2025-05-15), 100.0);
        assert_eq!(load_factor(&r), 1.0);
        assert_eq!(load_factor(&record(1, date!(2025-05-15), 0.0)), 0.0);
    }

    #[test]
    fn accounts_are_annotated_separately() {
        let annotated = annotate_accounts(vec![
            record(2, date!(2025-01-31), 50.0),
            record(1, date!(2025-01-31), 500.0),
            record(2, date!(2025-03-02), 40.0),
        ]);
        let account_two: Vec<f64> = annotated
            .iter()
            .filter(|b| b.record.account_id == 2)
            .map(|b| b.contract_demand_kw)
            .collect();
        assert_eq!(account_two, vec![50.0, 50.0]);
        assert_eq!(annotated[0].record.account_id, 1);
    }
}
