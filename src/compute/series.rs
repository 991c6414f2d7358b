//! Zero-indexed and time-indexed count series.
//!
//! A [`ZeroIndexedSeries`] is a flat `Vec<f64>` where one element is designated
//! as index zero, so negative indices address history. [`TimeSeries`] adds a
//! wall-clock anchor and a resolution so timestamps map onto indices:
//!
//! ```text
//! timestamp = t_zero + unit * resolution * (index - zero)
//! ```
//!
//! Writes outside the current storage grow the array, re-centering `zero`
//! when the write lands before the first element.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// A sequence of doubles addressed relative to a zero offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroIndexedSeries {
    values: Vec<f64>,
    zero: usize,
}

impl Default for ZeroIndexedSeries {
    fn default() -> Self {
        Self {
            values: vec![0.0],
            zero: 0,
        }
    }
}

impl ZeroIndexedSeries {
    /// Wrap existing values, with `zero` pointing into them.
    pub fn new(zero: usize, values: Vec<f64>) -> Self {
        Self { values, zero }
    }

    /// All stored values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Storage position of index zero.
    pub fn zero(&self) -> usize {
        self.zero
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values from index zero onward (inclusive).
    pub fn predictions(&self) -> &[f64] {
        &self.values[self.zero.min(self.values.len())..]
    }

    /// Values strictly before index zero.
    pub fn base_values(&self) -> &[f64] {
        &self.values[..self.zero.min(self.values.len())]
    }

    /// Append values to the end of the series.
    pub fn append(&mut self, extra: &[f64]) {
        self.values.extend_from_slice(extra);
    }

    /// Add `amount` at the storage position `index`, growing the array as needed.
    ///
    /// A negative `index` prepends storage and shifts `zero` so existing
    /// values keep their relative indices.
    pub fn add_counts_at_position(&mut self, index: i64, amount: f64) {
        let index = if index < 0 {
            let grow = index.unsigned_abs() as usize;
            let mut grown = vec![0.0; grow + self.values.len()];
            grown[grow..].copy_from_slice(&self.values);
            self.values = grown;
            self.zero += grow;
            0
        } else {
            let index = index as usize;
            if index >= self.values.len() {
                self.values.resize(index + 1, 0.0);
            }
            index
        };
        self.values[index] += amount;
    }

    /// Add `amount` at the index relative to zero.
    pub fn add_counts(&mut self, index: i64, amount: f64) {
        self.add_counts_at_position(index + self.zero as i64, amount);
    }

    /// Add one at the index relative to zero.
    pub fn increment(&mut self, index: i64) {
        self.add_counts(index, 1.0);
    }

    /// Value at the index relative to zero; zero outside storage.
    pub fn count_at(&self, index: i64) -> f64 {
        let position = index + self.zero as i64;
        if position < 0 {
            return 0.0;
        }
        self.values.get(position as usize).copied().unwrap_or(0.0)
    }

    /// Restrict the series to indices `[t_min, t_max)` relative to zero.
    ///
    /// The retained window always contains index zero; positions outside
    /// `[t_min, t_max]` are cleared before the copy, and the new storage spans
    /// `min(t_min, 0)..max(t_max, 0)`.
    pub fn trim(&mut self, t_min: i64, t_max: i64) {
        let zero = self.zero as i64;
        for (i, v) in self.values.iter_mut().enumerate() {
            let i = i as i64;
            if i < zero + t_min || i > zero + t_max {
                *v = 0.0;
            }
        }

        let lo = t_min.min(0);
        let hi = t_max.max(0);
        let trimmed: Vec<f64> = (lo..hi)
            .map(|offset| {
                let source = zero + offset;
                if source >= 0 {
                    self.values.get(source as usize).copied().unwrap_or(0.0)
                } else {
                    0.0
                }
            })
            .collect();

        self.values = trimmed;
        self.zero = lo.unsigned_abs() as usize;
    }

    /// Sum of all values.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// Time unit a [`TimeSeries`] resolution is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResolutionUnit {
    Minutes,
    Hours,
    #[default]
    Days,
}

impl ResolutionUnit {
    /// Length of `n` units.
    pub fn span(self, n: i64) -> TimeDelta {
        match self {
            Self::Minutes => TimeDelta::minutes(n),
            Self::Hours => TimeDelta::hours(n),
            Self::Days => TimeDelta::days(n),
        }
    }

    fn seconds(self) -> i64 {
        match self {
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }

    /// Whole units between two instants, truncated toward zero.
    pub fn between(self, from: NaiveDateTime, to: NaiveDateTime) -> i64 {
        (to - from).num_seconds() / self.seconds()
    }
}

/// A [`ZeroIndexedSeries`] anchored in wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    t_zero: NaiveDateTime,
    resolution: i64,
    unit: ResolutionUnit,
    series: ZeroIndexedSeries,
}

impl TimeSeries {
    /// An empty series anchored at `t_zero`, one bucket per `resolution` units.
    pub fn new(t_zero: NaiveDateTime, resolution: i64, unit: ResolutionUnit) -> Self {
        Self::with_values(t_zero, resolution, unit, ZeroIndexedSeries::default())
    }

    pub fn with_values(
        t_zero: NaiveDateTime,
        resolution: i64,
        unit: ResolutionUnit,
        series: ZeroIndexedSeries,
    ) -> Self {
        Self {
            t_zero,
            resolution: resolution.max(1),
            unit,
            series,
        }
    }

    pub fn t_zero(&self) -> NaiveDateTime {
        self.t_zero
    }

    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    pub fn unit(&self) -> ResolutionUnit {
        self.unit
    }

    pub fn series(&self) -> &ZeroIndexedSeries {
        &self.series
    }

    pub fn into_series(self) -> ZeroIndexedSeries {
        self.series
    }

    pub fn values(&self) -> &[f64] {
        self.series.values()
    }

    fn step_seconds(&self) -> i64 {
        self.unit.seconds() * self.resolution
    }

    /// Bucket index (relative to zero) containing `time`.
    ///
    /// Times before the anchor floor toward negative infinity, so a time one
    /// second before `t_zero` falls in bucket `-1`.
    pub fn index_of(&self, time: NaiveDateTime) -> i64 {
        (time - self.t_zero)
            .num_seconds()
            .div_euclid(self.step_seconds())
    }

    /// Timestamp at the start of bucket `index`.
    pub fn time_of(&self, index: i64) -> NaiveDateTime {
        self.t_zero + self.unit.span(index * self.resolution)
    }

    pub fn add_counts_at(&mut self, time: NaiveDateTime, amount: f64) {
        let index = self.index_of(time);
        self.series.add_counts(index, amount);
    }

    pub fn increment_at(&mut self, time: NaiveDateTime) {
        self.add_counts_at(time, 1.0);
    }

    pub fn count_at_time(&self, time: NaiveDateTime) -> f64 {
        self.series.count_at(self.index_of(time))
    }

    /// Every stored bucket keyed by its start time.
    pub fn values_by_time(&self) -> Vec<(NaiveDateTime, f64)> {
        let zero = self.series.zero() as i64;
        self.series
            .values()
            .iter()
            .enumerate()
            .map(|(i, v)| (self.time_of(i as i64 - zero), *v))
            .collect()
    }

    /// Superimpose `other` onto this series bucket by bucket, keyed by time.
    ///
    /// Buckets of `other` that fall outside this series' storage extend it.
    pub fn add(&mut self, other: &TimeSeries) {
        for (time, value) in other.values_by_time() {
            if value != 0.0 {
                self.add_counts_at(time, value);
            }
        }
    }

    /// Re-anchor this series at `zero_time`, sampling buckets `[t_min, t_max)`.
    ///
    /// Offsets are counted in this series' unit; the result has one bucket
    /// per resolution step and `zero` at `-t_min` when `t_min <= 0`.
    pub fn lift(&self, zero_time: NaiveDateTime, t_min: i64, t_max: i64) -> TimeSeries {
        let mut lifted = TimeSeries::new(zero_time, self.resolution, self.unit);
        let end = zero_time + self.unit.span(t_max);
        let mut position = zero_time + self.unit.span(t_min);
        while position < end {
            lifted.add_counts_at(position, self.count_at_time(position));
            position += self.unit.span(self.resolution);
        }
        lifted
    }

    /// Trim to the index window `[t_min, t_max)`.
    pub fn trim(&mut self, t_min: i64, t_max: i64) {
        self.series.trim(t_min, t_max);
    }

    /// Trim to a window whose bounds are expressed in `window_unit`.
    pub fn trim_in(&mut self, t_min: i64, t_max: i64, window_unit: ResolutionUnit) {
        let to_buckets = |t: i64| {
            self.unit
                .between(self.t_zero, self.t_zero + window_unit.span(t))
                / self.resolution
        };
        let (lo, hi) = (to_buckets(t_min), to_buckets(t_max));
        self.series.trim(lo, hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_default_series_has_one_bucket() {
        let s = ZeroIndexedSeries::default();
        assert_eq!(s.values(), &[0.0]);
        assert_eq!(s.zero(), 0);
    }

    #[test]
    fn test_add_counts_grows_both_ends() {
        let mut s = ZeroIndexedSeries::default();
        s.add_counts(3, 2.0);
        assert_eq!(s.values(), &[0.0, 0.0, 0.0, 2.0]);

        s.add_counts(-2, 1.0);
        assert_eq!(s.zero(), 2);
        assert_eq!(s.count_at(-2), 1.0);
        assert_eq!(s.count_at(3), 2.0);
        assert_eq!(s.count_at(-5), 0.0);
        assert_eq!(s.count_at(40), 0.0);
    }

    #[test]
    fn test_predictions_and_base_values_split_at_zero() {
        let s = ZeroIndexedSeries::new(2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.base_values(), &[1.0, 2.0]);
        assert_eq!(s.predictions(), &[3.0, 4.0]);
    }

    #[test]
    fn test_trim_keeps_half_open_window() {
        let mut s = ZeroIndexedSeries::new(3, vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        s.trim(-2, 2);
        assert_eq!(s.zero(), 2);
        assert_eq!(s.values(), &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_trim_window_always_contains_zero() {
        let mut s = ZeroIndexedSeries::new(0, vec![5.0, 1.0, 1.0, 1.0]);
        s.trim(2, 3);
        assert_eq!(s.zero(), 0);
        assert_eq!(s.values(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_index_of_floors_before_anchor() {
        let ts = TimeSeries::new(at(10, 0), 1, ResolutionUnit::Days);
        assert_eq!(ts.index_of(at(10, 0)), 0);
        assert_eq!(ts.index_of(at(10, 23)), 0);
        assert_eq!(ts.index_of(at(11, 0)), 1);
        assert_eq!(ts.index_of(at(9, 23)), -1);
        assert_eq!(ts.index_of(at(9, 0)), -1);
        assert_eq!(ts.index_of(at(8, 12)), -2);
    }

    #[test]
    fn test_index_of_respects_resolution() {
        let ts = TimeSeries::new(at(10, 0), 6, ResolutionUnit::Hours);
        assert_eq!(ts.index_of(at(10, 5)), 0);
        assert_eq!(ts.index_of(at(10, 6)), 1);
        assert_eq!(ts.index_of(at(9, 18)), -1);
        assert_eq!(ts.time_of(2), at(10, 12));
    }

    #[test]
    fn test_add_superimposes_by_timestamp() {
        let mut a = TimeSeries::new(at(10, 0), 1, ResolutionUnit::Days);
        a.add_counts_at(at(10, 0), 1.0);
        let mut b = TimeSeries::new(at(12, 0), 1, ResolutionUnit::Days);
        b.add_counts_at(at(10, 0), 2.0);
        b.add_counts_at(at(13, 0), 4.0);

        a.add(&b);
        assert_eq!(a.count_at_time(at(10, 0)), 3.0);
        assert_eq!(a.count_at_time(at(13, 0)), 4.0);
    }

    #[test]
    fn test_lift_reanchors_window() {
        let mut gt = TimeSeries::new(at(1, 0), 1, ResolutionUnit::Days);
        for d in 1..=20 {
            gt.add_counts_at(at(d, 0), d as f64);
        }
        let lifted = gt.lift(at(10, 0), -3, 2);
        assert_eq!(lifted.series().zero(), 3);
        assert_eq!(lifted.values(), &[7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_trim_in_days_on_hourly_series() {
        let mut ts = TimeSeries::new(at(10, 0), 1, ResolutionUnit::Hours);
        ts.add_counts_at(at(9, 0), 1.0);
        ts.add_counts_at(at(8, 0), 1.0);
        ts.add_counts_at(at(10, 5), 1.0);
        ts.trim_in(-1, 1, ResolutionUnit::Days);
        assert_eq!(ts.series().zero(), 24);
        assert_eq!(ts.values().len(), 48);
        assert_eq!(ts.series().total(), 2.0);
    }
}
