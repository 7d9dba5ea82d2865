use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tariff_client::domain::{BillingWindow, ChargeConfig, RateHistory, RateTable};

use super::{lookup, time_of_use_rate, Resolution};
use crate::classify::{classify, ChargeClassFilter, ChargeKind, DEMAND_RATE_FIELD};

/// StartTime/EndTime pair identifying a time-of-use demand line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouWindow {
    pub start_time: String,
    pub end_time: String,
}

impl TouWindow {
    pub fn new(start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            start_time: start_time.into(),
            end_time: end_time.into(),
        }
    }
}

/// Tariff-specific names used to pick the demand rates the bill is built on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffProfile {
    pub contract_demand_description: String,
    pub as_used_description: String,
    pub summer_season: String,
    pub midpeak_window: TouWindow,
    pub peak_window: TouWindow,
}

impl Default for TariffProfile {
    fn default() -> Self {
        Self {
            contract_demand_description: "Contract Demand Delivery Charge".to_string(),
            as_used_description: "As-used Daily Demand Delivery Charge".to_string(),
            summer_season: "june-sept".to_string(),
            midpeak_window: TouWindow::new("800", "1759"),
            peak_window: TouWindow::new("800", "2159"),
        }
    }
}

/// One classified charge line with its resolved rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCharge {
    pub key: String,
    pub description: String,
    pub kind: ChargeKind,
    /// `None` when no rate entry matched the description.
    pub rate: Option<f64>,
}

/// Scalar rates for one billing window.
///
/// Each rate is `None` when the tariff never produced it, which keeps a
/// legitimately zero rate apart from a missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedRateSet {
    pub contract_demand_rate: Option<f64>,
    pub midpeak_rate_summer: Option<f64>,
    pub peak_rate_summer: Option<f64>,
    pub as_used_rate_nonsummer: Option<f64>,
    pub customer_charge: Option<f64>,
    pub processing_charge: Option<f64>,
    /// $/kWh components of the energy surcharge, by charge key.
    pub kwh_charge_breakdown: BTreeMap<String, f64>,
    pub charges: Vec<ResolvedCharge>,
}

impl ResolvedRateSet {
    /// Sum of every $/kWh component.
    pub fn surcharge_rate(&self) -> f64 {
        self.kwh_charge_breakdown.values().sum()
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Drop an earlier line with the same key. The later row replaces it.
fn replace_duplicate(set: &mut ResolvedRateSet, key: &str) {
    let Some(pos) = set.charges.iter().position(|c| c.key == key) else {
        return;
    };
    let earlier = set.charges.remove(pos);
    tracing::warn!(
        key,
        description = %earlier.description,
        "duplicate charge key in tariff, later row replaces earlier one"
    );
    match earlier.kind {
        ChargeKind::Energy => {
            set.kwh_charge_breakdown.remove(key);
        }
        ChargeKind::CustomerCharge => set.customer_charge = None,
        ChargeKind::Processing => set.processing_charge = None,
        ChargeKind::Demand => {}
    }
}

/// Resolve every participating charge line plus the mapped demand rates.
///
/// Rows that share a charge key are billed once, from the last such row. A
/// later customer or processing line replaces an earlier one.
pub fn extract_rate_set(
    history: &RateHistory,
    charges: &[ChargeConfig],
    window: &BillingWindow,
    filter: &ChargeClassFilter,
    profile: &TariffProfile,
) -> ResolvedRateSet {
    let mut set = ResolvedRateSet::default();

    for row in charges {
        let Some(class) = classify(row, filter) else {
            continue;
        };
        let key = class.key;
        replace_duplicate(&mut set, &key);
        let rate = lookup(
            history.table(class.table),
            &row.description,
            class.field,
            window,
            class.resolution,
        )
        .map(|r| round_to(r, 10));

        if rate.is_none() {
            tracing::debug!(charge = %key, table = class.table.name(), "no rate entries match charge, billing it at zero");
            metrics::counter!("zero_rate_charges_total").increment(1);
        }

        match class.kind {
            ChargeKind::Energy => {
                set.kwh_charge_breakdown
                    .insert(key.clone(), rate.unwrap_or(0.0));
            }
            ChargeKind::CustomerCharge => set.customer_charge = rate,
            ChargeKind::Processing => set.processing_charge = rate,
            ChargeKind::Demand => {}
        }

        set.charges.push(ResolvedCharge {
            key,
            description: row.description.clone(),
            kind: class.kind,
            rate,
        });
    }

    let season = profile.summer_season.trim().to_lowercase();
    let demand_time = history.table(RateTable::DemandTime);
    set.midpeak_rate_summer = time_of_use_rate(
        demand_time,
        &profile.midpeak_window,
        &season,
        DEMAND_RATE_FIELD,
        window,
    );
    set.peak_rate_summer = time_of_use_rate(
        demand_time,
        &profile.peak_window,
        &season,
        DEMAND_RATE_FIELD,
        window,
    );
    set.as_used_rate_nonsummer = lookup(
        demand_time,
        &profile.as_used_description,
        DEMAND_RATE_FIELD,
        window,
        Resolution::LATEST,
    );
    set.contract_demand_rate = lookup(
        history.table(RateTable::Demand),
        &profile.contract_demand_description,
        DEMAND_RATE_FIELD,
        window,
        Resolution::LATEST.prorated(),
    );

    set
}
