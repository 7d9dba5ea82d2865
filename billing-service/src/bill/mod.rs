//! Bill assembly: combines resolved rates with usage and demand into an
//! itemized bill.
//!
//! Each line amount is rounded to cents for display. The total is summed from
//! unrounded line values and rounded once.

use serde::Serialize;
use tariff_client::domain::{dates, BillingWindow};
use time::Date;

use crate::demand::{AmiSummary, DailyDemandRow, Season};
use crate::rates::{ResolvedRateSet, round_to};

const CENTS: i32 = 2;
const RATE_PLACES: i32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixedCharge {
    pub amount: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractDemandCharge {
    pub amount: f64,
    pub kw: f64,
    pub rate: f64,
    pub billing_days: i64,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummerDemandCharge {
    pub amount: f64,
    pub midpeak_kw_sum: f64,
    pub midpeak_rate: f64,
    pub peak_kw_sum: f64,
    pub peak_rate: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonSummerDemandCharge {
    pub amount: f64,
    pub sum_daily_max_kw: f64,
    pub rate: f64,
    pub days: usize,
    pub avg_daily_max_kw: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyComponent {
    pub key: String,
    pub rate_per_kwh: f64,
    pub charge: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergySurcharge {
    pub amount: f64,
    pub rate_per_kwh: f64,
    pub usage_kwh: f64,
    pub breakdown: Vec<EnergyComponent>,
    pub description: &'static str,
}

/// Taxes applied to the bill total, recorded for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxApplied {
    pub pre_tax_total: f64,
    pub grt_rate: f64,
    pub sales_tax_rate: f64,
}

/// Identifiers carried through to the bill unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillHeader {
    pub account_id: i64,
    pub as_billed: Option<f64>,
    pub load_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bill {
    pub account_id: i64,
    #[serde(serialize_with = "dates::serialize_date")]
    pub date_from: Date,
    #[serde(serialize_with = "dates::serialize_date")]
    pub date_to: Date,
    pub as_billed: Option<f64>,
    pub billing_days: i64,
    pub load_factor: f64,
    pub customer_charge: FixedCharge,
    pub processing_charge: FixedCharge,
    pub contract_demand_charge: ContractDemandCharge,
    pub demand_charge_summer: SummerDemandCharge,
    pub demand_charge_nonsummer: NonSummerDemandCharge,
    pub energy_surcharge: EnergySurcharge,
    pub ami: Option<AmiSummary>,
    pub total: f64,
    pub tax: Option<TaxApplied>,
}

impl Bill {
    pub fn with_ami(self, ami: Option<AmiSummary>) -> Self {
        Self { ami, ..self }
    }

    /// Total before taxes were applied.
    pub fn pre_tax_total(&self) -> f64 {
        self.tax.as_ref().map_or(self.total, |t| t.pre_tax_total)
    }

    /// Calculated minus billed.
    pub fn variance(&self) -> Option<f64> {
        self.as_billed.map(|billed| self.total - billed)
    }

    pub fn accuracy_pct(&self) -> Option<f64> {
        match (self.variance(), self.as_billed) {
            (Some(variance), Some(billed)) if billed != 0.0 => {
                Some((1.0 - variance.abs() / billed.abs()) * 100.0)
            }
            _ => None,
        }
    }
}

/// A rate the tariff may not define. Missing and non-positive values bill at
/// zero.
fn applicable(rate: Option<f64>) -> f64 {
    rate.filter(|r| *r > 0.0).unwrap_or(0.0)
}

pub fn assemble(
    header: BillHeader,
    daily_demand: &[DailyDemandRow],
    usage_kwh: f64,
    window: &BillingWindow,
    rates: &ResolvedRateSet,
    contract_demand_kw: f64,
) -> Bill {
    let customer_charge = applicable(rates.customer_charge);
    let processing_charge = applicable(rates.processing_charge);

    let contract_rate = applicable(rates.contract_demand_rate);
    let contract_charge = contract_demand_kw * contract_rate;

    let (summer, nonsummer): (Vec<&DailyDemandRow>, Vec<&DailyDemandRow>) = daily_demand
        .iter()
        .partition(|row| row.season() == Season::Summer);

    let midpeak_kw_summer: f64 = summer
        .iter()
        .map(|r| r.mid_peak_demand_kw.unwrap_or(0.0))
        .sum();
    let peak_kw_summer: f64 = summer.iter().map(|r| r.peak_demand_kw.unwrap_or(0.0)).sum();
    let midpeak_rate = applicable(rates.midpeak_rate_summer);
    let peak_rate = applicable(rates.peak_rate_summer);
    let summer_charge = midpeak_kw_summer * midpeak_rate + peak_kw_summer * peak_rate;

    let nonsummer_daily_max: f64 = nonsummer
        .iter()
        .map(|r| {
            r.mid_peak_demand_kw
                .unwrap_or(0.0)
                .max(r.peak_demand_kw.unwrap_or(0.0))
        })
        .sum();
    let as_used_rate = applicable(rates.as_used_rate_nonsummer);
    let nonsummer_charge = nonsummer_daily_max * as_used_rate;
    let avg_daily_max = if nonsummer.is_empty() {
        0.0
    } else {
        nonsummer_daily_max / nonsummer.len() as f64
    };

    let surcharge_rate = rates.surcharge_rate();
    let surcharge = usage_kwh * surcharge_rate;
    let breakdown = rates
        .kwh_charge_breakdown
        .iter()
        .map(|(key, rate)| EnergyComponent {
            key: key.clone(),
            rate_per_kwh: *rate,
            charge: round_to(rate * usage_kwh, RATE_PLACES),
        })
        .collect();

    let total = customer_charge
        + processing_charge
        + contract_charge
        + summer_charge
        + nonsummer_charge
        + surcharge;

    Bill {
        account_id: header.account_id,
        date_from: window.start(),
        date_to: window.end(),
        as_billed: header.as_billed,
        billing_days: window.billing_days(),
        load_factor: header.load_factor,
        customer_charge: FixedCharge {
            amount: round_to(customer_charge, CENTS),
            description: "Fixed monthly customer service charge",
        },
        processing_charge: FixedCharge {
            amount: round_to(processing_charge, CENTS),
            description: "Billing & payment processing fee",
        },
        contract_demand_charge: ContractDemandCharge {
            amount: round_to(contract_charge, CENTS),
            kw: contract_demand_kw,
            rate: contract_rate,
            billing_days: window.billing_days(),
            description: "Fixed monthly rate based on contracted demand",
        },
        demand_charge_summer: SummerDemandCharge {
            amount: round_to(summer_charge, CENTS),
            midpeak_kw_sum: round_to(midpeak_kw_summer, CENTS),
            midpeak_rate,
            peak_kw_sum: round_to(peak_kw_summer, CENTS),
            peak_rate,
            description: "Sum of midpeak and peak daily demand (Summer)",
        },
        demand_charge_nonsummer: NonSummerDemandCharge {
            amount: round_to(nonsummer_charge, CENTS),
            sum_daily_max_kw: round_to(nonsummer_daily_max, CENTS),
            rate: as_used_rate,
            days: nonsummer.len(),
            avg_daily_max_kw: round_to(avg_daily_max, CENTS),
            description: "Sum of daily max(kW) for Non-Summer",
        },
        energy_surcharge: EnergySurcharge {
            amount: round_to(surcharge, CENTS),
            rate_per_kwh: round_to(surcharge_rate, RATE_PLACES),
            usage_kwh,
            breakdown,
            description: "Total of all $/kWh delivery surcharges",
        },
        ami: None,
        total: round_to(total, CENTS),
        tax: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use time::macros::date;

    const HEADER: BillHeader = BillHeader {
        account_id: 42,
        as_billed: Some(17230.93),
        load_factor: 0.0,
    };

    fn april() -> BillingWindow {
        BillingWindow::new(date!(2025-04-16), date!(2025-05-15)).unwrap()
    }

    fn rates() -> ResolvedRateSet {
        ResolvedRateSet {
            contract_demand_rate: Some(8.874 * 29.0 / 30.0),
            midpeak_rate_summer: Some(0.55),
            peak_rate_summer: Some(0.75),
            as_used_rate_nonsummer: Some(1.1744),
            customer_charge: Some(68.63),
            processing_charge: None,
            kwh_charge_breakdown: [
                ("system_benefits_charge".to_string(), 0.0042123456),
                ("clean_energy_standard".to_string(), 0.0011),
                ("transmission_revenue_adj".to_string(), -0.0005),
            ]
            .into_iter()
            .collect(),
            charges: Vec::new(),
        }
    }

    #[test]
    fn nonsummer_demand_uses_daily_max() {
        let days = vec![
            DailyDemandRow::new(date!(2025-04-17), Some(320.0), Some(350.0)),
            DailyDemandRow::new(date!(2025-04-18), Some(330.0), Some(0.0)),
        ];
        let set = ResolvedRateSet {
            as_used_rate_nonsummer: Some(1.1744),
            ..ResolvedRateSet::default()
        };
        let bill = assemble(HEADER, &days, 0.0, &april(), &set, 0.0);
        assert_eq!(bill.demand_charge_nonsummer.sum_daily_max_kw, 680.0);
        assert_eq!(bill.demand_charge_nonsummer.amount, 798.59);
        assert_eq!(bill.demand_charge_nonsummer.days, 2);
        assert_eq!(bill.demand_charge_nonsummer.avg_daily_max_kw, 340.0);
        assert_eq!(bill.total, 798.59);
    }

    #[test]
    fn missing_daily_values_count_as_zero() {
        let days = vec![
            DailyDemandRow::new(date!(2025-04-17), None, Some(100.0)),
            DailyDemandRow::new(date!(2025-04-18), None, None),
            DailyDemandRow::new(date!(2025-07-01), Some(200.0), None),
        ];
        let bill = assemble(HEADER, &days, 0.0, &april(), &rates(), 0.0);
        assert_eq!(bill.demand_charge_nonsummer.sum_daily_max_kw, 100.0);
        assert_eq!(bill.demand_charge_summer.midpeak_kw_sum, 200.0);
        assert_eq!(bill.demand_charge_summer.peak_kw_sum, 0.0);
        assert_eq!(bill.demand_charge_summer.amount, 110.0);
    }

    #[test]
    fn summer_demand_prices_mid_and_peak_separately() {
        let days = vec![
            DailyDemandRow::new(date!(2025-07-01), Some(300.0), Some(250.0)),
            DailyDemandRow::new(date!(2025-07-02), Some(310.0), Some(260.0)),
        ];
        let bill = assemble(HEADER, &days, 0.0, &april(), &rates(), 0.0);
        let summer = &bill.demand_charge_summer;
        assert_eq!(summer.midpeak_kw_sum, 610.0);
        assert_eq!(summer.peak_kw_sum, 510.0);
        assert_abs_diff_eq!(summer.amount, 610.0 * 0.55 + 510.0 * 0.75, epsilon = 0.005);
        assert_eq!(bill.demand_charge_nonsummer.days, 0);
        assert_eq!(bill.demand_charge_nonsummer.avg_daily_max_kw, 0.0);
    }

    #[test]
    fn energy_breakdown_sums_to_surcharge() {
        let usage = 128_627.0;
        let set = rates();
        let bill = assemble(HEADER, &[], usage, &april(), &set, 382.0);
        let surcharge = &bill.energy_surcharge;
        let parts: f64 = surcharge.breakdown.iter().map(|c| c.charge).sum();
        assert_abs_diff_eq!(parts, usage * set.surcharge_rate(), epsilon = 1e-8);
        assert_eq!(surcharge.amount, round_to(usage * set.surcharge_rate(), 2));
        assert_eq!(surcharge.breakdown.len(), 3);
        assert_eq!(surcharge.usage_kwh, usage);
    }

    #[test]
    fn total_is_rounded_once_from_unrounded_lines() {
        let set = rates();
        let usage = 128_627.0;
        let bill = assemble(HEADER, &[], usage, &april(), &set, 382.0);

        let contract = 382.0 * 8.874 * 29.0 / 30.0;
        let expected = 68.63 + contract + usage * set.surcharge_rate();
        assert_eq!(bill.total, round_to(expected, 2));
        assert_eq!(bill.contract_demand_charge.amount, round_to(contract, 2));
        assert_eq!(bill.contract_demand_charge.billing_days, 29);
        assert_eq!(bill.processing_charge.amount, 0.0);
        assert_eq!(bill.account_id, 42);
        assert_eq!(bill.date_from, date!(2025-04-16));
        assert_eq!(bill.variance(), Some(bill.total - 17230.93));
        assert!(bill.accuracy_pct().is_some());
    }

    #[test]
    fn zero_rates_keep_every_line() {
        let days = vec![DailyDemandRow::new(date!(2025-04-17), Some(0.0), Some(0.0))];
        let bill = assemble(
            BillHeader {
                account_id: 1,
                as_billed: None,
                load_factor: 0.0,
            },
            &days,
            0.0,
            &april(),
            &ResolvedRateSet::default(),
            0.0,
        );
        assert_eq!(bill.total, 0.0);
        for amount in [
            bill.customer_charge.amount,
            bill.processing_charge.amount,
            bill.contract_demand_charge.amount,
            bill.demand_charge_summer.amount,
            bill.demand_charge_nonsummer.amount,
            bill.energy_surcharge.amount,
        ] {
            assert_eq!(amount, 0.0);
        }
        assert_eq!(bill.variance(), None);
        assert_eq!(bill.accuracy_pct(), None);
    }

    #[test]
    fn negative_scalar_rates_bill_at_zero() {
        let set = ResolvedRateSet {
            contract_demand_rate: Some(-3.0),
            customer_charge: Some(-10.0),
            ..ResolvedRateSet::default()
        };
        let bill = assemble(HEADER, &[], 0.0, &april(), &set, 500.0);
        assert_eq!(bill.contract_demand_charge.rate, 0.0);
        assert_eq!(bill.total, 0.0);
    }
}
