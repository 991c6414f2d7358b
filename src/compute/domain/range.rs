//! Bounded numeric range over `f64`.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Assignment, DomainError, EXPANSION_COEFFICIENT, QueryDomain, range_contains};

/// A `[min, max)` region inside `[domain_min, domain_max]`.
///
/// Bounds move by `r^k` times the available room, so small steps are far more
/// likely than large ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    domain_min: f64,
    domain_max: f64,
    min: f64,
    max: f64,
    #[serde(default = "default_coefficient")]
    coefficient: f64,
    #[serde(default)]
    inverted: bool,
}

fn default_coefficient() -> f64 {
    EXPANSION_COEFFICIENT
}

impl NumericRange {
    /// A range spanning the whole domain.
    pub fn new(domain_min: f64, domain_max: f64) -> Self {
        Self {
            domain_min,
            domain_max,
            min: domain_min,
            max: domain_max,
            coefficient: EXPANSION_COEFFICIENT,
            inverted: false,
        }
    }

    pub fn with_coefficient(mut self, coefficient: f64) -> Self {
        self.coefficient = coefficient;
        self
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.domain_min, self.domain_max)
    }

    /// Assign the region, clamping to the domain.
    pub fn set_values(&mut self, min: f64, max: f64) -> Result<Assignment, DomainError> {
        if min.is_nan() || max.is_nan() {
            return Err(DomainError::NotANumber);
        }
        if min > max {
            return Err(DomainError::InvalidBounds(format!(
                "min ({}) > max ({})",
                min, max
            )));
        }
        let clamped_min = min.max(self.domain_min).min(self.domain_max);
        let clamped_max = max.min(self.domain_max).max(clamped_min);
        self.min = clamped_min;
        self.max = clamped_max;
        if clamped_min == min && clamped_max == max {
            Ok(Assignment::Exact)
        } else {
            Ok(Assignment::Clamped)
        }
    }

    fn step<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.r#gen::<f64>().powf(self.coefficient)
    }

    fn raise_floor<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.min += self.step(rng) * (self.max - self.min);
        self.min = self.min.min(self.max);
    }

    fn lower_ceiling<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.max -= self.step(rng) * (self.max - self.min);
        self.max = self.max.max(self.min);
    }

    fn lower_floor<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.min -= self.step(rng) * (self.min - self.domain_min);
        self.min = self.min.max(self.domain_min);
    }

    fn raise_ceiling<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.max += self.step(rng) * (self.domain_max - self.max);
        self.max = self.max.min(self.domain_max);
    }
}

impl QueryDomain for NumericRange {
    type Value = f64;

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
        if self.min == self.domain_min {
            self.raise_ceiling(rng);
        } else if self.max == self.domain_max {
            self.lower_floor(rng);
        } else if rng.gen_bool(0.5) {
            self.lower_floor(rng);
        } else {
            self.raise_ceiling(rng);
        }
        true
    }

    fn reduce<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_reduce() {
            return false;
        }
        if rng.gen_bool(0.5) {
            self.raise_floor(rng);
        } else {
            self.lower_ceiling(rng);
        }
        true
    }

    fn contains(&self, value: &f64) -> bool {
        range_contains(*value, self.min, self.max, self.domain_max)
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.max == self.domain_max { ']' } else { ')' };
        let bang = if self.inverted { "!" } else { "" };
        write!(f, "{}[{},{}{}", bang, self.min, self.max, close)
    }
}
