//! Mutable, boundable predicate fragments over a single event attribute.
//!
//! Every primitive has fixed domain bounds chosen at construction and a
//! current matching region inside them. Search moves the region toward the
//! domain bounds (`expand`) or away from them (`reduce`).
//!
//! | Type | Region | Step |
//! |------|--------|------|
//! | [`NumericRange`] | `[min, max)` over `f64` | `r^k * room` |
//! | [`IntegerRange`] | `[min, max)` over `i64` | one unit, 20% extra |
//! | [`WrappedRange`] | circular `[min, max)` | one unit, 20% extra |
//! | [`OrderedSubrange`] | positions into a fixed sequence | one position |
//! | [`UnorderedSubset`] | in-list / out-list | one random element |

mod integer;
mod ordered_set;
mod range;
mod unordered_set;
mod wrapped;

pub use integer::IntegerRange;
pub use ordered_set::OrderedSubrange;
pub use range::NumericRange;
pub use unordered_set::UnorderedSubset;
pub use wrapped::WrappedRange;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponent applied to the uniform draw when a numeric bound moves.
pub const EXPANSION_COEFFICIENT: f64 = 3.0;

/// Probability that an integer step is followed by another one.
pub const EXTRA_STEP_PROBABILITY: f64 = 0.2;

/// How a primitive's region is initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InitMethod {
    /// Region covers the whole domain.
    #[default]
    Full,
    /// Region is a random sub-region.
    Random,
}

/// Outcome of an accepted region assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Stored as requested.
    Exact,
    /// At least one bound was clamped to the domain.
    Clamped,
}

/// Rejected region assignment. The primitive keeps its prior region.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
    #[error("Bounds must not be NaN")]
    NotANumber,
    #[error("Selection shares no value with the domain")]
    EmptySelection,
}

/// Common contract of the domain primitives.
pub trait QueryDomain {
    /// Attribute value type tested by [`QueryDomain::matches`].
    type Value: ?Sized;

    fn init_full(&mut self);

    fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R);

    fn can_expand(&self) -> bool;

    fn can_reduce(&self) -> bool;

    /// Move the region toward the domain bounds. Returns whether it changed.
    fn expand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool;

    /// Move the region away from the domain bounds. Returns whether it changed.
    fn reduce<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool;

    /// Whether `value` falls in the region, before inversion.
    fn contains(&self, value: &Self::Value) -> bool;

    fn is_inverted(&self) -> bool;

    fn set_inverted(&mut self, inverted: bool);

    fn init<R: Rng + ?Sized>(&mut self, method: InitMethod, rng: &mut R) {
        match method {
            InitMethod::Full => self.init_full(),
            InitMethod::Random => self.init_random(rng),
        }
    }

    /// Complement the match semantics.
    fn invert(&mut self) {
        let inverted = self.is_inverted();
        self.set_inverted(!inverted);
    }

    fn matches(&self, value: &Self::Value) -> bool {
        self.contains(value) != self.is_inverted()
    }

    /// Expand with probability `expand_bias` when both moves are possible,
    /// otherwise perform whichever move is available.
    fn mutate<R: Rng + ?Sized>(&mut self, expand_bias: f64, rng: &mut R) -> bool {
        match (self.can_reduce(), self.can_expand()) {
            (true, true) => {
                if rng.r#gen::<f64>() < expand_bias {
                    self.expand(rng)
                } else {
                    self.reduce(rng)
                }
            }
            (true, false) => self.reduce(rng),
            (false, true) => self.expand(rng),
            (false, false) => false,
        }
    }
}

/// Range test shared by the endpoint-based primitives.
///
/// A degenerate region matches only its single point. Otherwise the upper
/// bound is exclusive unless it sits at (or past) the domain ceiling.
pub(crate) fn range_contains<N: PartialOrd>(value: N, min: N, max: N, ceiling: N) -> bool {
    if min == max {
        value == min
    } else if max < ceiling {
        value >= min && value < max
    } else {
        value >= min && value <= max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains_half_open_below_ceiling() {
        assert!(range_contains(2, 2, 5, 10));
        assert!(range_contains(4, 2, 5, 10));
        assert!(!range_contains(5, 2, 5, 10));
        assert!(!range_contains(1, 2, 5, 10));
    }

    #[test]
    fn test_range_contains_inclusive_at_ceiling() {
        assert!(range_contains(10, 2, 10, 10));
        assert!(!range_contains(11, 2, 10, 10));
    }

    #[test]
    fn test_range_contains_degenerate() {
        assert!(range_contains(3, 3, 3, 10));
        assert!(!range_contains(4, 3, 3, 10));
    }
}
