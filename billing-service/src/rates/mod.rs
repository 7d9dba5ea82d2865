//! Rate resolution: collapses an effective-dated rate history into one scalar
//! per charge line for a billing window.

mod rate_set;

pub use rate_set::{extract_rate_set, ResolvedCharge, ResolvedRateSet, TariffProfile, TouWindow};
pub(crate) use rate_set::round_to;

use tariff_client::domain::{BillingWindow, RateEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Rate of the newest entry effective on or before the window end.
    LatestEffective,
    /// Average of every entry active during the window, weighted by days.
    DayWeightedAverage,
}

/// How one charge line is resolved: a mode plus optional proration to the
/// billing period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub mode: ResolutionMode,
    pub prorated: bool,
}

impl Resolution {
    pub const LATEST: Resolution = Resolution {
        mode: ResolutionMode::LatestEffective,
        prorated: false,
    };

    pub fn for_flags(weighted: bool, prorated: bool) -> Self {
        let mode = if weighted {
            ResolutionMode::DayWeightedAverage
        } else {
            ResolutionMode::LatestEffective
        };
        Self { mode, prorated }
    }

    pub fn prorated(self) -> Self {
        Self {
            prorated: true,
            ..self
        }
    }
}

/// Entries whose description contains `description`, ignoring case.
pub fn matching_entries<'a>(entries: &'a [RateEntry], description: &str) -> Vec<&'a RateEntry> {
    entries
        .iter()
        .filter(|e| e.matches_description(description))
        .collect()
}

/// Entries effective on or before the window end that carry `field`, ordered by
/// (effective date, sequence).
fn effective_rates<'a>(
    entries: &[&'a RateEntry],
    field: &str,
    window: &BillingWindow,
) -> Vec<(&'a RateEntry, f64)> {
    let mut eligible: Vec<(&RateEntry, f64)> = entries
        .iter()
        .copied()
        .filter(|e| e.effective_date <= window.end())
        .filter_map(|e| e.rate(field).map(|r| (e, r)))
        .collect();
    eligible.sort_by_key(|(e, _)| (e.effective_date, e.sequence));
    eligible
}

/// Newest effective rate. Entries sharing the newest date resolve to the one
/// with the highest sequence number. No eligible entry resolves to `0.0`.
pub fn latest_effective(entries: &[&RateEntry], field: &str, window: &BillingWindow) -> f64 {
    effective_rates(entries, field, window)
        .last()
        .map(|(_, rate)| *rate)
        .unwrap_or(0.0)
}

/// Day-weighted average over the window.
///
/// Each entry covers `[max(effective, start), min(end, next effective))`.
/// Entries superseded before the window opens produce a negative span and are
/// dropped. A zero total weight resolves to `0.0`.
pub fn day_weighted_average(entries: &[&RateEntry], field: &str, window: &BillingWindow) -> f64 {
    let eligible = effective_rates(entries, field, window);

    let mut weighted_sum = 0.0;
    let mut total_days: i64 = 0;
    for (i, (entry, rate)) in eligible.iter().enumerate() {
        let span_start = entry.effective_date.max(window.start());
        let span_end = match eligible.get(i + 1) {
            Some((next, _)) => next.effective_date.min(window.end()),
            None => window.end(),
        };
        let days = (span_end - span_start).whole_days();
        if days < 0 {
            continue;
        }
        weighted_sum += days as f64 * rate;
        total_days += days;
    }

    if total_days > 0 {
        weighted_sum / total_days as f64
    } else {
        0.0
    }
}

/// Scale a monthly rate to the window: `rate * billing_days / 30`.
pub fn prorate(rate: f64, window: &BillingWindow) -> f64 {
    rate * window.month_fraction()
}

pub fn resolve(
    entries: &[&RateEntry],
    field: &str,
    window: &BillingWindow,
    resolution: Resolution,
) -> f64 {
    let rate = match resolution.mode {
        ResolutionMode::LatestEffective => latest_effective(entries, field, window),
        ResolutionMode::DayWeightedAverage => day_weighted_average(entries, field, window),
    };
    if resolution.prorated {
        prorate(rate, window)
    } else {
        rate
    }
}

/// Resolve the charge named `description` from one rate table.
///
/// `None` means no entry matched the description at all; a match that resolves
/// to zero is `Some(0.0)`.
pub fn lookup(
    table: &[RateEntry],
    description: &str,
    field: &str,
    window: &BillingWindow,
    resolution: Resolution,
) -> Option<f64> {
    let entries = matching_entries(table, description);
    if entries.is_empty() {
        return None;
    }
    Some(resolve(&entries, field, window, resolution))
}

/// Latest-effective rate among time-of-use entries whose StartTime/EndTime
/// match exactly and whose season, trimmed and lower-cased, equals `season`.
pub fn time_of_use_rate(
    table: &[RateEntry],
    tou: &TouWindow,
    season: &str,
    field: &str,
    window: &BillingWindow,
) -> Option<f64> {
    let entries: Vec<&RateEntry> = table
        .iter()
        .filter(|e| e.start_time.as_deref() == Some(tou.start_time.as_str()))
        .filter(|e| e.end_time.as_deref() == Some(tou.end_time.as_str()))
        .filter(|e| {
            e.season
                .as_deref()
                .is_some_and(|s| s.trim().to_lowercase() == season)
        })
        .collect();
    if entries.is_empty() {
        return None;
    }
    Some(latest_effective(&entries, field, window))
}
