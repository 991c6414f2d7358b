//! Contiguous subrange of a fixed, ordered sequence of values.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Assignment, DomainError, QueryDomain};

/// Positions `[min, max)` into `values`; when `min == max` the single value
/// at `min` is matched.
///
/// The match set is rebuilt every time the positions change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de> + Ord + Clone"
))]
#[serde(from = "OrderedSubrangeRepr<T>", into = "OrderedSubrangeRepr<T>")]
pub struct OrderedSubrange<T: Ord + Clone> {
    values: Vec<T>,
    min: usize,
    max: usize,
    inverted: bool,
    matching: BTreeSet<T>,
}

#[derive(Serialize, Deserialize)]
struct OrderedSubrangeRepr<T> {
    values: Vec<T>,
    min: usize,
    max: usize,
    #[serde(default)]
    inverted: bool,
}

impl<T: Ord + Clone> From<OrderedSubrangeRepr<T>> for OrderedSubrange<T> {
    fn from(repr: OrderedSubrangeRepr<T>) -> Self {
        let len = repr.values.len();
        let mut out = Self {
            values: repr.values,
            min: repr.min.min(len.saturating_sub(1)),
            max: repr.max.min(len),
            inverted: repr.inverted,
            matching: BTreeSet::new(),
        };
        out.max = out.max.max(out.min);
        out.rebuild();
        out
    }
}

impl<T: Ord + Clone> From<OrderedSubrange<T>> for OrderedSubrangeRepr<T> {
    fn from(set: OrderedSubrange<T>) -> Self {
        Self {
            values: set.values,
            min: set.min,
            max: set.max,
            inverted: set.inverted,
        }
    }
}

impl<T: Ord + Clone> OrderedSubrange<T> {
    /// A subrange covering every value.
    pub fn new(values: Vec<T>) -> Self {
        let max = values.len();
        let mut out = Self {
            values,
            min: 0,
            max,
            inverted: false,
            matching: BTreeSet::new(),
        };
        out.rebuild();
        out
    }

    fn rebuild(&mut self) {
        self.matching.clear();
        if self.values.is_empty() {
            return;
        }
        if self.min == self.max {
            if let Some(v) = self.values.get(self.min) {
                self.matching.insert(v.clone());
            }
        } else {
            self.matching
                .extend(self.values[self.min..self.max].iter().cloned());
        }
    }

    pub fn positions(&self) -> (usize, usize) {
        (self.min, self.max)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Values currently matched, ignoring inversion.
    pub fn matching_values(&self) -> &BTreeSet<T> {
        &self.matching
    }

    /// Assign positions, clamping `max` to the sequence length.
    pub fn set_positions(&mut self, min: usize, max: usize) -> Result<Assignment, DomainError> {
        if min > max {
            return Err(DomainError::InvalidBounds(format!(
                "min position ({}) > max position ({})",
                min, max
            )));
        }
        let len = self.values.len();
        let clamped_max = max.min(len);
        let clamped_min = min.min(clamped_max).min(len.saturating_sub(1));
        self.min = clamped_min;
        self.max = clamped_max;
        self.rebuild();
        if clamped_min == min && clamped_max == max {
            Ok(Assignment::Exact)
        } else {
            Ok(Assignment::Clamped)
        }
    }
}

impl<T: Ord + Clone> QueryDomain for OrderedSubrange<T> {
    type Value = T;

    fn init_full(&mut self) {
        self.min = 0;
        self.max = self.values.len();
        self.rebuild();
    }

    fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let len = self.values.len();
        if len == 0 {
            self.min = 0;
            self.max = 0;
        } else {
            let p1 = rng.gen_range(0..=len);
            let p2 = rng.gen_range(0..=len);
            (self.min, self.max) = match p1.cmp(&p2) {
                std::cmp::Ordering::Less => (p1, p2),
                std::cmp::Ordering::Greater => (p2, p1),
                std::cmp::Ordering::Equal if p1 == len => (p1 - 1, p1),
                std::cmp::Ordering::Equal => (p1, p1 + 1),
            };
        }
        self.rebuild();
    }

    fn can_expand(&self) -> bool {
        !(self.min == 0 && self.max == self.values.len())
    }

    fn can_reduce(&self) -> bool {
        self.min < self.max && self.min + 1 != self.values.len()
    }

    fn expand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        // (p, p) matches the same single value as (p, p + 1).
        if self.min == self.max && self.max < self.values.len() {
            self.max += 1;
        }
        if !self.can_expand() {
            return false;
        }
        let before = self.matching.len();
        if self.min == 0 {
            self.max += 1;
        } else if self.max == self.values.len() || rng.gen_bool(0.5) {
            self.min -= 1;
        } else {
            self.max += 1;
        }
        self.rebuild();
        self.matching.len() != before
    }

    fn reduce<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_reduce() {
            return false;
        }
        if self.min == 0 {
            self.max -= 1;
        } else if self.max == self.values.len() || rng.gen_bool(0.5) {
            self.min += 1;
        } else {
            self.max -= 1;
        }
        self.rebuild();
        true
    }

    fn contains(&self, value: &T) -> bool {
        self.matching.contains(value)
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }
}

impl<T: Ord + Clone + fmt::Display> fmt::Display for OrderedSubrange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bang = if self.inverted { "!" } else { "" };
        let mut iter = self.matching.iter();
        match (iter.next(), self.matching.iter().next_back()) {
            (Some(first), Some(last)) => write!(f, "{}[{},{}]", bang, first, last),
            _ => write!(f, "{}[]", bang),
        }
    }
}
