//! Bounded integer range.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Assignment, DomainError, EXTRA_STEP_PROBABILITY, QueryDomain, range_contains};

/// A `[min, max)` region of integers inside `[domain_min, domain_max]`.
///
/// Each move shifts one bound by a single unit, with a chance of repeating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerRange {
    domain_min: i64,
    domain_max: i64,
    min: i64,
    max: i64,
    #[serde(default)]
    inverted: bool,
}

impl IntegerRange {
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

    pub fn domain(&self) -> (i64, i64) {
        (self.domain_min, self.domain_max)
    }

    pub fn set_values(&mut self, min: i64, max: i64) -> Result<Assignment, DomainError> {
        if min > max {
            return Err(DomainError::InvalidBounds(format!(
                "min ({}) > max ({})",
                min, max
            )));
        }
        let clamped_min = min.clamp(self.domain_min, self.domain_max);
        let clamped_max = max.clamp(clamped_min, self.domain_max);
        self.min = clamped_min;
        self.max = clamped_max;
        if clamped_min == min && clamped_max == max {
            Ok(Assignment::Exact)
        } else {
            Ok(Assignment::Clamped)
        }
    }

    /// Every integer the region currently accepts, ignoring inversion.
    pub fn matching_values(&self) -> Vec<i64> {
        (self.min..=self.max)
            .filter(|v| self.contains(v))
            .collect()
    }
}

impl QueryDomain for IntegerRange {
    type Value = i64;

    fn init_full(&mut self) {
        self.min = self.domain_min;
        self.max = self.domain_max;
    }

    fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let a = rng.gen_range(self.domain_min..=self.domain_max);
        let b = rng.gen_range(self.domain_min..=self.domain_max);
        self.min = a.min(b);
        self.max = a.max(b);
    }

    fn can_expand(&self) -> bool {
        !(self.min == self.domain_min && self.max == self.domain_max)
    }

    fn can_reduce(&self) -> bool {
        self.min != self.max
    }

    fn expand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_expand() {
            return false;
        }
        loop {
            if self.min == self.domain_min {
                self.max += 1;
            } else if self.max == self.domain_max || rng.gen_bool(0.5) {
                self.min -= 1;
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
                self.min += 1;
            } else {
                self.max -= 1;
            }
            if !self.can_reduce() || !rng.gen_bool(EXTRA_STEP_PROBABILITY) {
                return true;
            }
        }
    }

    fn contains(&self, value: &i64) -> bool {
        range_contains(*value, self.min, self.max, self.domain_max)
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }
}

impl fmt::Display for IntegerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.max == self.domain_max { ']' } else { ')' };
        let bang = if self.inverted { "!" } else { "" };
        write!(f, "{}[{},{}{}", bang, self.min, self.max, close)
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
    fn test_full_range() {
        let r = IntegerRange::new(1, 4);
        assert!((1..=4).all(|v| r.matches(&v)));
        assert!(!r.matches(&0));
        assert!(!r.can_expand());
        assert_eq!(r.matching_values(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reduce_then_expand_returns_to_full() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut r = IntegerRange::new(0, 10);
        let before: Vec<bool> = (0..=10).map(|v| r.matches(&v)).collect();

        assert!(r.reduce(&mut rng));
        assert!(r.can_expand());
        while r.expand(&mut rng) {}

        let after: Vec<bool> = (0..=10).map(|v| r.matches(&v)).collect();
        assert_eq!(before, after);
        assert_eq!((r.min(), r.max()), (0, 10));
    }

    #[test]
    fn test_degenerate_region_cannot_reduce() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut r = IntegerRange::new(0, 10);
        r.set_values(4, 4).unwrap();
        assert!(!r.can_reduce());
        assert!(!r.reduce(&mut rng));
        assert!(r.matches(&4));
        assert!(!r.matches(&5));
    }

    #[test]
    fn test_set_values_rejects_inverted_bounds() {
        let mut r = IntegerRange::new(0, 10);
        r.set_values(2, 6).unwrap();
        assert!(r.set_values(7, 3).is_err());
        assert_eq!((r.min(), r.max()), (2, 6));
        assert_eq!(r.set_values(-5, 3), Ok(Assignment::Clamped));
        assert_eq!(r.min(), 0);
    }

    proptest! {
        #[test]
        fn prop_mutation_keeps_order_and_bounds(seed in any::<u64>(), steps in 1usize..300) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut r = IntegerRange::new(-5, 5);
            r.init(InitMethod::Random, &mut rng);
            for _ in 0..steps {
                r.mutate(0.5, &mut rng);
                prop_assert!(r.min() <= r.max());
                prop_assert!(r.min() >= -5 && r.max() <= 5);
            }
        }
    }
}
