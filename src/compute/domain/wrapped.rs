//! Circular integer range, e.g. longitude.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Assignment, DomainError, EXTRA_STEP_PROBABILITY, QueryDomain, range_contains};

/// An integer region on a circular domain.
///
/// `min` stays inside `[domain_min, domain_max)`; `max` may run past
/// `domain_max`, in which case the overflow wraps around to the low end of
/// the domain. The region never spans more than `domain_max - domain_min`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedRange {
    domain_min: i64,
    domain_max: i64,
    min: i64,
    max: i64,
    #[serde(default)]
    inverted: bool,
}

impl WrappedRange {
    pub fn new(domain_min: i64, domain_max: i64) -> Self {
        Self {
            domain_min,
            domain_max,
            min: domain_min,
            max: domain_max,
            inverted: false,
        }
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Width of one full turn of the domain.
    pub fn range_size(&self) -> i64 {
        self.domain_max - self.domain_min
    }

    /// Assign the region. `max` may exceed `domain_max` to express wrap-around.
    pub fn set_values(&mut self, min: i64, max: i64) -> Result<Assignment, DomainError> {
        if min > max {
            return Err(DomainError::InvalidBounds(format!(
                "min ({}) > max ({})",
                min, max
            )));
        }
        let clamped_min = min.clamp(self.domain_min, self.domain_max);
        let clamped_max = max.clamp(clamped_min, clamped_min + self.range_size());
        self.min = clamped_min;
        self.max = clamped_max;
        if clamped_min == min && clamped_max == max {
            Ok(Assignment::Exact)
        } else {
            Ok(Assignment::Clamped)
        }
    }

    fn raise_floor(&mut self) {
        self.min += 1;
        if self.min == self.domain_max {
            self.min = self.domain_min;
            self.max -= self.range_size();
        }
    }

    fn lower_floor(&mut self) {
        self.min -= 1;
        if self.min < self.domain_min {
            self.min += self.range_size();
            self.max += self.range_size();
        }
    }
}

impl QueryDomain for WrappedRange {
    type Value = i64;

    fn init_full(&mut self) {
        self.min = self.domain_min;
        self.max = self.domain_max;
    }

    fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let size = self.range_size().max(1);
        self.min = self.domain_min + rng.gen_range(0..size);
        self.max = self.min + rng.gen_range(0..size);
    }

    fn can_expand(&self) -> bool {
        self.max - self.min < self.range_size()
    }

    fn can_reduce(&self) -> bool {
        self.max > self.min
    }

    fn expand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_expand() {
            return false;
        }
        loop {
            if rng.gen_bool(0.5) {
                self.lower_floor();
            } else {
                self.max += 1;
            }
            if !self.can_expand() || !rng.gen_bool(EXTRA_STEP_PROBABILITY) {
                return true;
            }
        }
    }

    fn reduce<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_reduce() {
            return false;
        }
        loop {
            if rng.gen_bool(0.5) {
                self.raise_floor();
            } else {
                self.max -= 1;
            }
            if !self.can_reduce() || !rng.gen_bool(EXTRA_STEP_PROBABILITY) {
                return true;
            }
        }
    }

    fn contains(&self, value: &i64) -> bool {
        let mut value = *value;
        if value < self.min {
            value += self.range_size();
        }
        range_contains(value, self.min, self.max, self.domain_max)
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }
}

impl fmt::Display for WrappedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bang = if self.inverted { "!" } else { "" };
        if self.max > self.domain_max {
            write!(
                f,
                "{}[{},{}]|[{},{}]",
                bang,
                self.min,
                self.domain_max,
                self.domain_min,
                self.max - self.range_size()
            )
        } else {
            write!(f, "{}[{},{}]", bang, self.min, self.max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::domain::InitMethod;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_full_matches_every_value() {
        let r = WrappedRange::new(-4, 8);
        assert!((-4..=8).all(|v| r.matches(&v)));
        assert!(!r.can_expand());
    }

    #[test]
    fn test_region_crossing_ceiling_wraps() {
        let mut r = WrappedRange::new(-4, 8);
        r.set_values(5, 10).unwrap();
        let matched: Vec<i64> = (-4..=8).filter(|v| r.matches(v)).collect();
        assert_eq!(matched, vec![-4, -3, -2, 5, 6, 7, 8]);
    }

    #[test]
    fn test_region_below_ceiling_is_half_open() {
        let mut r = WrappedRange::new(-4, 8);
        r.set_values(0, 3).unwrap();
        let matched: Vec<i64> = (-4..=8).filter(|v| r.matches(v)).collect();
        assert_eq!(matched, vec![0, 1, 2]);
    }

    #[test]
    fn test_floor_crossing_domain_max_recenters() {
        let mut r = WrappedRange::new(-4, 8);
        r.set_values(7, 12).unwrap();
        r.raise_floor();
        assert_eq!((r.min(), r.max()), (-4, 0));
    }

    #[test]
    fn test_floor_crossing_domain_min_recenters() {
        let mut r = WrappedRange::new(-4, 8);
        r.set_values(-4, 2).unwrap();
        r.lower_floor();
        assert_eq!((r.min(), r.max()), (7, 14));
        assert!(r.matches(&7));
        assert!(r.matches(&1));
        assert!(!r.matches(&3));
    }

    proptest! {
        #[test]
        fn prop_span_never_exceeds_domain(seed in any::<u64>(), steps in 1usize..300) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut r = WrappedRange::new(-180, 180);
            r.init(InitMethod::Random, &mut rng);
            for _ in 0..steps {
                r.mutate(0.5, &mut rng);
                prop_assert!(r.min() <= r.max());
                prop_assert!(r.max() - r.min() <= r.range_size());
                prop_assert!(r.min() >= -180 && r.min() < 180);
            }
        }
    }
}
