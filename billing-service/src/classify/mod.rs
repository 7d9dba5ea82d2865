//! Charge classification: decides which tariff lines participate in a bill,
//! which rate table each one resolves against, and how.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tariff_client::domain::{ChargeConfig, ChargeUnit, RateTable, ServiceType};

use crate::rates::Resolution;

/// Set of charge classes whose energy lines participate in a calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeClassFilter {
    classes: BTreeSet<ServiceType>,
}

impl ChargeClassFilter {
    pub fn new(classes: impl IntoIterator<Item = ServiceType>) -> Self {
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn contains(&self, service_type_id: i32) -> bool {
        ServiceType::from_id(service_type_id).is_some_and(|st| self.classes.contains(&st))
    }

    pub fn classes(&self) -> impl Iterator<Item = ServiceType> + '_ {
        self.classes.iter().copied()
    }
}

impl Default for ChargeClassFilter {
    fn default() -> Self {
        ChargeClassPreset::default().filter()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown charge class combination '{0}'")]
pub struct UnknownPreset(pub String);

/// Named charge class combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeClassPreset {
    #[default]
    TransmissionDelivery,
    TransmissionSupply,
    TransmissionOnly,
    SupplyOnly,
    DeliveryOnly,
}

impl ChargeClassPreset {
    pub const ALL: [ChargeClassPreset; 5] = [
        Self::TransmissionDelivery,
        Self::TransmissionSupply,
        Self::TransmissionOnly,
        Self::SupplyOnly,
        Self::DeliveryOnly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::TransmissionDelivery => "transmission_delivery",
            Self::TransmissionSupply => "transmission_supply",
            Self::TransmissionOnly => "transmission_only",
            Self::SupplyOnly => "supply_only",
            Self::DeliveryOnly => "delivery_only",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::TransmissionDelivery => "Transmission + Delivery charges",
            Self::TransmissionSupply => "Transmission + Supply charges",
            Self::TransmissionOnly => "Transmission charges only",
            Self::SupplyOnly => "Supply charges only",
            Self::DeliveryOnly => "Delivery charges only",
        }
    }

    pub fn service_types(self) -> &'static [ServiceType] {
        use ServiceType::*;
        match self {
            Self::TransmissionDelivery => &[Transmission, Delivery],
            Self::TransmissionSupply => &[Transmission, Supply],
            Self::TransmissionOnly => &[Transmission],
            Self::SupplyOnly => &[Supply],
            Self::DeliveryOnly => &[Delivery],
        }
    }

    pub fn filter(self) -> ChargeClassFilter {
        ChargeClassFilter::new(self.service_types().iter().copied())
    }
}

impl fmt::Display for ChargeClassPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChargeClassPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}

/// Semantic bucket a charge line falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeKind {
    /// $/kWh line, part of the energy surcharge.
    Energy,
    /// $/kW line.
    Demand,
    /// Fixed monthly customer charge.
    CustomerCharge,
    /// Fixed monthly billing and payment processing fee.
    Processing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeClassification {
    pub key: String,
    pub kind: ChargeKind,
    pub table: RateTable,
    pub field: &'static str,
    pub resolution: Resolution,
}

pub const ENERGY_RATE_FIELD: &str = "RatekWh";
pub const DEMAND_RATE_FIELD: &str = "RatekW";
pub const SERVICE_CHARGE_FIELD: &str = "Rate";
pub const OTHER_CHARGE_FIELD: &str = "ChargeType";

/// Lower-case the description, turn spaces into `_` and drop `-`, `/` and `:`.
///
/// `"Billing and Payment Processing Ch"` becomes
/// `"billing_and_payment_processing_ch"`.
pub fn semantic_key(description: &str) -> String {
    description
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '/' | ':'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Classify one charge configuration row. Rows that do not map to any bucket
/// yield `None` and are left out of the resolved rate set.
///
/// Rules apply in order: an energy line outside the active filter falls
/// through to the fixed-charge checks, like any other unmatched row.
pub fn classify(row: &ChargeConfig, filter: &ChargeClassFilter) -> Option<ChargeClassification> {
    let line_resolution = Resolution::for_flags(row.weighted, row.prorated);

    let (kind, table, field) = match row.unit {
        ChargeUnit::Kwh if filter.contains(row.service_type_id) => {
            (ChargeKind::Energy, RateTable::Energy, ENERGY_RATE_FIELD)
        }
        ChargeUnit::Kw => (ChargeKind::Demand, RateTable::Demand, DEMAND_RATE_FIELD),
        _ if row.description.contains("Customer Charge") => (
            ChargeKind::CustomerCharge,
            RateTable::ServiceCharge,
            SERVICE_CHARGE_FIELD,
        ),
        _ if row.description.contains("Processing") => (
            ChargeKind::Processing,
            RateTable::OtherCharges,
            OTHER_CHARGE_FIELD,
        ),
        _ => return None,
    };

    Some(ChargeClassification {
        key: semantic_key(&row.description),
        kind,
        table,
        field,
        resolution: line_resolution,
    })
}

/// How many configured lines of each unit a charge class combination pulls in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeMix {
    pub preset: ChargeClassPreset,
    pub total_charges: usize,
    pub kwh_charges: usize,
    pub kw_charges: usize,
    pub monthly_charges: usize,
    pub descriptions: Vec<String>,
}

pub fn charge_mix(charges: &[ChargeConfig], preset: ChargeClassPreset) -> ChargeMix {
    let filter = preset.filter();
    let selected: Vec<&ChargeConfig> = charges
        .iter()
        .filter(|c| filter.contains(c.service_type_id))
        .collect();
    let count = |unit: ChargeUnit| selected.iter().filter(|c| c.unit == unit).count();

    ChargeMix {
        preset,
        total_charges: selected.len(),
        kwh_charges: count(ChargeUnit::Kwh),
        kw_charges: count(ChargeUnit::Kw),
        monthly_charges: count(ChargeUnit::PerMonth),
        descriptions: selected.iter().map(|c| c.description.clone()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixComparison {
    pub left: ChargeMix,
    pub right: ChargeMix,
    pub only_left: Vec<String>,
    pub only_right: Vec<String>,
}

pub fn compare_mixes(
    charges: &[ChargeConfig],
    left: ChargeClassPreset,
    right: ChargeClassPreset,
) -> MixComparison {
    let left = charge_mix(charges, left);
    let right = charge_mix(charges, right);
    let l: BTreeSet<&String> = left.descriptions.iter().collect();
    let r: BTreeSet<&String> = right.descriptions.iter().collect();
    let only_left = l.difference(&r).map(|s| (*s).clone()).collect();
    let only_right = r.difference(&l).map(|s| (*s).clone()).collect();

    MixComparison {
        left,
        right,
        only_left,
        only_right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::ResolutionMode;
    use ServiceType::*;

    fn sample_charges() -> Vec<ChargeConfig> {
        vec![
            ChargeConfig::new("System Benefits Charge", ChargeUnit::Kwh, Delivery).weighted(),
            ChargeConfig::new("Merchant Function Charge", ChargeUnit::Kwh, Supply),
            ChargeConfig::new("Transmission Revenue Adj", ChargeUnit::Kwh, Transmission),
            ChargeConfig::new("Contract Demand Delivery Charge", ChargeUnit::Kw, Delivery)
                .prorated(),
            ChargeConfig::new("Customer Charge", ChargeUnit::PerMonth, Delivery),
            ChargeConfig::new(
                "Billing and Payment Processing Ch",
                ChargeUnit::PerMonth,
                Delivery,
            ),
            ChargeConfig::new("Reactive Power", ChargeUnit::Other("kVarh".into()), Delivery),
        ]
    }

    #[test]
    fn semantic_key_normalizes_separators() {
        assert_eq!(semantic_key("Customer Charge"), "customer_charge");
        assert_eq!(
            semantic_key(" Billing and Payment Processing Ch "),
            "billing_and_payment_processing_ch"
        );
        assert_eq!(
            semantic_key("Clean Energy Std - Tier 1/ZEC: Delivery"),
            "clean_energy_std__tier_1zec_delivery"
        );
    }

    #[test]
    fn energy_lines_respect_active_filter() {
        let charges = sample_charges();
        let filter = ChargeClassFilter::default();

        let sbc = classify(&charges[0], &filter).unwrap();
        assert_eq!(sbc.kind, ChargeKind::Energy);
        assert_eq!(sbc.table, RateTable::Energy);
        assert_eq!(sbc.field, ENERGY_RATE_FIELD);
        assert_eq!(sbc.resolution.mode, ResolutionMode::DayWeightedAverage);

        assert!(classify(&charges[1], &filter).is_none());
        let supply = ChargeClassPreset::TransmissionSupply.filter();
        assert_eq!(classify(&charges[1], &supply).unwrap().kind, ChargeKind::Energy);
        assert!(classify(&charges[0], &supply).is_none());
    }

    #[test]
    fn demand_lines_ignore_filter() {
        let charges = sample_charges();
        let c = classify(&charges[3], &ChargeClassPreset::SupplyOnly.filter()).unwrap();
        assert_eq!(c.kind, ChargeKind::Demand);
        assert_eq!(c.field, DEMAND_RATE_FIELD);
        assert!(c.resolution.prorated);
        assert_eq!(c.resolution.mode, ResolutionMode::LatestEffective);
    }

    #[test]
    fn fixed_charges_and_unmatched_rows() {
        let charges = sample_charges();
        let filter = ChargeClassFilter::default();

        let customer = classify(&charges[4], &filter).unwrap();
        assert_eq!(customer.kind, ChargeKind::CustomerCharge);
        assert_eq!((customer.table, customer.field), (RateTable::ServiceCharge, "Rate"));

        let processing = classify(&charges[5], &filter).unwrap();
        assert_eq!(processing.kind, ChargeKind::Processing);
        assert_eq!(processing.key, "billing_and_payment_processing_ch");
        assert_eq!(processing.field, OTHER_CHARGE_FIELD);

        assert!(classify(&charges[6], &filter).is_none());
    }

    #[test]
    fn presets_parse_by_name() {
        assert_eq!(
            "Transmission_Supply".parse::<ChargeClassPreset>().unwrap(),
            ChargeClassPreset::TransmissionSupply
        );
        assert!("everything".parse::<ChargeClassPreset>().is_err());
        let filter = ChargeClassPreset::default().filter();
        assert_eq!(filter.classes().collect::<Vec<_>>(), vec![Transmission, Delivery]);
        assert!(!filter.contains(1));
        assert!(!filter.contains(99));
    }

    #[test]
    fn mix_comparison_lists_unique_descriptions() {
        let charges = sample_charges();
        let cmp = compare_mixes(
            &charges,
            ChargeClassPreset::TransmissionSupply,
            ChargeClassPreset::TransmissionDelivery,
        );
        assert_eq!(cmp.left.total_charges, 2);
        assert_eq!(cmp.left.kwh_charges, 2);
        assert_eq!(cmp.right.total_charges, 6);
        assert_eq!(cmp.right.kw_charges, 1);
        assert_eq!(cmp.right.monthly_charges, 2);
        assert_eq!(cmp.only_left, vec!["Merchant Function Charge".to_string()]);
        assert_eq!(cmp.only_right.len(), 5);
    }
}
