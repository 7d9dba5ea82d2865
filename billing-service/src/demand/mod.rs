//! Demand segmentation: turns raw interval readings into seasonal and
//! time-of-use demand figures.

use std::collections::BTreeMap;

use serde::Serialize;
use tariff_client::domain::{dates, BillingWindow, DemandSample};
use time::{Date, Duration, PrimitiveDateTime};

/// June through September.
pub const SUMMER_MONTHS: [u8; 4] = [6, 7, 8, 9];
pub const PEAK_START_HOUR: u8 = 8;
pub const ON_PEAK_END_HOUR: u8 = 18;
pub const MID_PEAK_END_HOUR: u8 = 22;
/// Six 5-minute intervals make the 30-minute demand window.
pub const ROLLING_INTERVALS: usize = 6;
/// kWh over 30 minutes to an hourly kW equivalent.
pub const HOURLY_DEMAND_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Summer,
    NonSummer,
}

impl Season {
    pub fn of_month(month: u8) -> Self {
        if SUMMER_MONTHS.contains(&month) {
            Self::Summer
        } else {
            Self::NonSummer
        }
    }

    pub fn of(date: Date) -> Self {
        Self::of_month(u8::from(date.month()))
    }
}

/// Time-of-use flags of one interval. On-peak intervals are also mid-peak;
/// off-peak means neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TouFlags {
    pub on_peak: bool,
    pub mid_peak: bool,
    pub off_peak: bool,
}

pub fn tou_flags(start: PrimitiveDateTime, end: PrimitiveDateTime) -> TouFlags {
    let starts_in_day = start.hour() >= PEAK_START_HOUR && end.hour() != 0;
    let on_peak = starts_in_day
        && end.hour() < ON_PEAK_END_HOUR
        && SUMMER_MONTHS.contains(&u8::from(end.month()));
    let mid_peak = starts_in_day && end.hour() < MID_PEAK_END_HOUR;

    TouFlags {
        on_peak,
        mid_peak,
        off_peak: !on_peak && !mid_peak,
    }
}

/// Usage of one 5-minute interval, summed over every channel that reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalUsage {
    pub start: PrimitiveDateTime,
    pub end: PrimitiveDateTime,
    pub usage_kwh: f64,
    pub flags: TouFlags,
}

/// Valid demand intervals lying fully inside `[start + 1 day, end]`, grouped by
/// (start, end) and ordered by start.
pub fn demand_intervals(samples: &[DemandSample], window: &BillingWindow) -> Vec<IntervalUsage> {
    let lower = (window.start() + Duration::days(1)).midnight();
    let upper = window.end().midnight();

    let mut grouped: BTreeMap<(PrimitiveDateTime, PrimitiveDateTime), f64> = BTreeMap::new();
    let mut discarded: u64 = 0;
    for sample in samples {
        if sample.start < lower || sample.end > upper {
            continue;
        }
        if !sample.is_demand_interval() {
            discarded += 1;
            continue;
        }
        *grouped.entry((sample.start, sample.end)).or_insert(0.0) += sample.usage_kwh;
    }
    if discarded > 0 {
        tracing::debug!(discarded, "skipped interval readings that are not 5-minute kWh");
        metrics::counter!("ami_samples_discarded_total").increment(discarded);
    }

    grouped
        .into_iter()
        .map(|((start, end), usage_kwh)| IntervalUsage {
            start,
            end,
            usage_kwh,
            flags: tou_flags(start, end),
        })
        .collect()
}

/// 30-minute demand in kW ending at each interval. The first five intervals
/// have no full window and yield `None`. The window runs over consecutive
/// readings, so gaps in the data are not padded.
pub fn rolling_demand_kw(intervals: &[IntervalUsage]) -> Vec<Option<f64>> {
    (0..intervals.len())
        .map(|i| {
            if i + 1 < ROLLING_INTERVALS {
                return None;
            }
            let sum: f64 = intervals[i + 1 - ROLLING_INTERVALS..=i]
                .iter()
                .map(|u| u.usage_kwh)
                .sum();
            Some(sum * HOURLY_DEMAND_FACTOR)
        })
        .collect()
}

fn max_of(current: Option<f64>, value: f64) -> Option<f64> {
    Some(current.map_or(value, |c| c.max(value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TouUsage {
    pub on_peak_kwh: f64,
    pub mid_peak_kwh: f64,
    pub off_peak_kwh: f64,
}

impl TouUsage {
    pub fn from_intervals(intervals: &[IntervalUsage]) -> Self {
        intervals.iter().fold(Self::default(), |mut acc, u| {
            if u.flags.on_peak {
                acc.on_peak_kwh += u.usage_kwh;
            }
            if u.flags.mid_peak {
                acc.mid_peak_kwh += u.usage_kwh;
            }
            if u.flags.off_peak {
                acc.off_peak_kwh += u.usage_kwh;
            }
            acc
        })
    }
}

/// Interval-data figures for one billing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmiSummary {
    /// Coincident peak: max 30-minute demand in kW. `None` with fewer than six
    /// intervals.
    pub demand_kw: Option<f64>,
    pub usage_kwh: f64,
    pub tou_usage: TouUsage,
    pub intervals: usize,
}

fn summarize(intervals: &[IntervalUsage], rolling: &[Option<f64>]) -> Option<AmiSummary> {
    if intervals.is_empty() {
        return None;
    }
    let demand_kw = rolling.iter().copied().flatten().fold(None, max_of);

    Some(AmiSummary {
        demand_kw,
        usage_kwh: intervals.iter().map(|u| u.usage_kwh).sum(),
        tou_usage: TouUsage::from_intervals(intervals),
        intervals: intervals.len(),
    })
}

/// `None` when no valid interval falls inside the window.
pub fn ami_summary(samples: &[DemandSample], window: &BillingWindow) -> Option<AmiSummary> {
    let intervals = demand_intervals(samples, window);
    summarize(&intervals, &rolling_demand_kw(&intervals))
}

pub fn coincident_demand(samples: &[DemandSample], window: &BillingWindow) -> Option<f64> {
    ami_summary(samples, window).and_then(|s| s.demand_kw)
}

/// Peak demand of one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyDemandRow {
    #[serde(serialize_with = "dates::serialize_date")]
    pub date: Date,
    pub mid_peak_demand_kw: Option<f64>,
    pub peak_demand_kw: Option<f64>,
}

impl DailyDemandRow {
    pub fn new(date: Date, mid_peak_demand_kw: Option<f64>, peak_demand_kw: Option<f64>) -> Self {
        Self {
            date,
            mid_peak_demand_kw,
            peak_demand_kw,
        }
    }

    pub fn season(&self) -> Season {
        Season::of(self.date)
    }
}

fn daily_rows(intervals: &[IntervalUsage], rolling: &[Option<f64>]) -> Vec<DailyDemandRow> {
    let mut days: BTreeMap<Date, DailyDemandRow> = BTreeMap::new();
    for (interval, demand) in intervals.iter().zip(rolling) {
        let date = interval.start.date();
        let row = days
            .entry(date)
            .or_insert_with(|| DailyDemandRow::new(date, None, None));
        let Some(kw) = *demand else {
            continue;
        };
        if interval.flags.mid_peak {
            row.mid_peak_demand_kw = max_of(row.mid_peak_demand_kw, kw);
        }
        if interval.flags.on_peak {
            row.peak_demand_kw = max_of(row.peak_demand_kw, kw);
        }
    }

    days.into_values().collect()
}

/// One row per day with readings: the highest 30-minute demand among the
/// day's mid-peak intervals and among its on-peak intervals.
pub fn segment(samples: &[DemandSample], window: &BillingWindow) -> Vec<DailyDemandRow> {
    let intervals = demand_intervals(samples, window);
    daily_rows(&intervals, &rolling_demand_kw(&intervals))
}

/// Daily rows and the AMI summary of one bill, from a single pass over the
/// account's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandProfile {
    pub daily: Vec<DailyDemandRow>,
    pub ami: Option<AmiSummary>,
}

pub fn demand_profile(samples: &[DemandSample], window: &BillingWindow) -> DemandProfile {
    let intervals = demand_intervals(samples, window);
    let rolling = rolling_demand_kw(&intervals);
    DemandProfile {
        daily: daily_rows(&intervals, &rolling),
        ami: summarize(&intervals, &rolling),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use time::macros::{date, datetime};

    fn sample(start: PrimitiveDateTime, minutes: i64, kwh: f64, unit: &str) -> DemandSample {
        DemandSample {
            start,
            end: start + Duration::minutes(minutes),
            usage_kwh: kwh,
            usage_unit: unit.to_string(),
        }
    }

    fn five_minute_run(start: PrimitiveDateTime, usages: &[f64]) -> Vec<DemandSample> {
        usages
            .iter()
            .enumerate()
            .map(|(i, kwh)| sample(start + Duration::minutes(5 * i as i64), 5, *kwh, "KWH"))
            .collect()
    }

    fn july() -> BillingWindow {
        BillingWindow::new(date!(2025-06-30), date!(2025-07-31)).unwrap()
    }

    #[test]
    fn seasons_by_month() {
        assert_eq!(Season::of(date!(2025-06-01)), Season::Summer);
        assert_eq!(Season::of(date!(2025-09-30)), Season::Summer);
        assert_eq!(Season::of(date!(2025-10-01)), Season::NonSummer);
        assert_eq!(Season::of(date!(2025-05-31)), Season::NonSummer);
    }

    #[test]
    fn time_of_use_flags() {
        let f = |s: PrimitiveDateTime| tou_flags(s, s + Duration::minutes(5));

        let summer_morning = f(datetime!(2025-07-01 08:00:00));
        assert!(summer_morning.on_peak && summer_morning.mid_peak && !summer_morning.off_peak);

        let summer_evening = f(datetime!(2025-07-01 18:00:00));
        assert!(!summer_evening.on_peak && summer_evening.mid_peak);

        let late = f(datetime!(2025-07-01 21:55:00));
        assert!(late.off_peak && !late.mid_peak);

        let early = f(datetime!(2025-07-01 07:55:00));
        assert!(early.off_peak);

        let winter = f(datetime!(2025-01-15 09:00:00));
        assert!(!winter.on_peak && winter.mid_peak);

        let midnight = f(datetime!(2025-07-01 23:55:00));
        assert!(midnight.off_peak);
    }

    #[test]
    fn intervals_are_filtered_and_grouped() {
        let mut samples = five_minute_run(datetime!(2025-07-01 08:00:00), &[1.0, 1.0]);
        samples.push(sample(datetime!(2025-07-01 08:00:00), 5, 0.5, "KWH"));
        samples.push(sample(datetime!(2025-07-01 09:00:00), 15, 3.0, "KWH"));
        samples.push(sample(datetime!(2025-07-01 09:00:00), 5, 3.0, "KVARH"));
        // The first billing day is excluded, as is anything ending after the window.
        samples.push(sample(datetime!(2025-06-30 12:00:00), 5, 9.0, "KWH"));
        samples.push(sample(datetime!(2025-07-30 23:58:00), 5, 9.0, "KWH"));

        let intervals = demand_intervals(&samples, &july());
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].usage_kwh, 1.5);
        assert_eq!(intervals[1].start, datetime!(2025-07-01 08:05:00));
    }

    #[test]
    fn rolling_window_needs_six_intervals() {
        let samples = five_minute_run(datetime!(2025-07-01 08:00:00), &[1.0; 5]);
        let summary = ami_summary(&samples, &july()).unwrap();
        assert_eq!(summary.demand_kw, None);
        assert_eq!(summary.usage_kwh, 5.0);
        assert_eq!(coincident_demand(&samples, &july()), None);
    }

    #[test]
    fn coincident_demand_doubles_peak_half_hour() {
        let usages = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 0.5];
        let samples = five_minute_run(datetime!(2025-07-01 08:00:00), &usages);
        let summary = ami_summary(&samples, &july()).unwrap();
        assert_abs_diff_eq!(summary.demand_kw.unwrap(), 24.0);
        assert_abs_diff_eq!(summary.usage_kwh, 18.5);
        assert_eq!(summary.intervals, 13);
        assert_abs_diff_eq!(summary.tou_usage.on_peak_kwh, 18.5);
        assert_abs_diff_eq!(summary.tou_usage.off_peak_kwh, 0.0);
    }

    #[test]
    fn no_valid_samples_leaves_demand_unset() {
        let samples = vec![sample(datetime!(2025-07-01 08:00:00), 60, 10.0, "KWH")];
        assert!(ami_summary(&samples, &july()).is_none());
        assert!(segment(&samples, &july()).is_empty());
    }

    #[test]
    fn daily_rows_split_mid_and_on_peak() {
        // Summer day: 17:20 to 18:20 spans the on-peak cutoff.
        let mut samples = five_minute_run(
            datetime!(2025-07-01 17:20:00),
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0],
        );
        // Next day only off-peak readings.
        samples.extend(five_minute_run(datetime!(2025-07-02 02:00:00), &[4.0; 6]));

        let rows = segment(&samples, &july());
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.date, date!(2025-07-01));
        assert_eq!(first.season(), Season::Summer);
        // On-peak intervals must end before 18:00; the last one starts at 17:50.
        assert_abs_diff_eq!(first.peak_demand_kw.unwrap(), 16.0);
        assert_abs_diff_eq!(first.mid_peak_demand_kw.unwrap(), 36.0);

        let second = &rows[1];
        assert_eq!(second.mid_peak_demand_kw, None);
        assert_eq!(second.peak_demand_kw, None);
    }

    #[test]
    fn profile_matches_separate_segment_and_summary() {
        let mut samples = five_minute_run(
            datetime!(2025-07-01 17:20:00),
            &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 3.0, 3.0, 3.0, 3.0, 3.0, 3.0],
        );
        samples.push(sample(datetime!(2025-07-01 09:00:00), 15, 3.0, "KWH"));

        let profile = demand_profile(&samples, &july());
        assert_eq!(profile.daily, segment(&samples, &july()));
        assert_eq!(profile.ami, ami_summary(&samples, &july()));
        assert_eq!(profile.ami.unwrap().intervals, 12);
    }
}
