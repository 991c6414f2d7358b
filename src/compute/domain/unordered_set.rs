//! Unordered subset of a fixed set of values.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Assignment, DomainError, QueryDomain};

/// Values are partitioned into an in-list (matched) and an out-list.
///
/// Mutation moves one uniformly chosen element across the partition. The
/// in-list is never emptied by `reduce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnorderedSubset<T> {
    included: Vec<T>,
    excluded: Vec<T>,
    #[serde(default)]
    inverted: bool,
}

impl<T: Clone + PartialEq> UnorderedSubset<T> {
    /// A subset containing every value.
    pub fn new(values: Vec<T>) -> Self {
        Self {
            included: values,
            excluded: Vec::new(),
            inverted: false,
        }
    }

    pub fn included(&self) -> &[T] {
        &self.included
    }

    pub fn excluded(&self) -> &[T] {
        &self.excluded
    }

    fn domain_values(&self) -> Vec<T> {
        self.included
            .iter()
            .chain(self.excluded.iter())
            .cloned()
            .collect()
    }

    /// Include exactly the domain values present in `selection`.
    ///
    /// Values outside the domain are ignored; a selection with no domain
    /// values is rejected.
    pub fn set_values(&mut self, selection: &[T]) -> Result<Assignment, DomainError> {
        let all = self.domain_values();
        let (included, excluded): (Vec<T>, Vec<T>) =
            all.into_iter().partition(|v| selection.contains(v));
        if included.is_empty() {
            return Err(DomainError::EmptySelection);
        }
        let exact = included.len() == selection.len();
        self.included = included;
        self.excluded = excluded;
        Ok(if exact {
            Assignment::Exact
        } else {
            Assignment::Clamped
        })
    }
}

impl<T: Clone + PartialEq> QueryDomain for UnorderedSubset<T> {
    type Value = T;

    fn init_full(&mut self) {
        let mut excluded = std::mem::take(&mut self.excluded);
        self.included.append(&mut excluded);
    }

    fn init_random<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let all = self.domain_values();
        if all.is_empty() {
            return;
        }
        loop {
            let (included, excluded): (Vec<T>, Vec<T>) =
                all.iter().cloned().partition(|_| rng.gen_bool(0.5));
            if !included.is_empty() {
                self.included = included;
                self.excluded = excluded;
                return;
            }
        }
    }

    fn can_expand(&self) -> bool {
        !self.excluded.is_empty()
    }

    fn can_reduce(&self) -> bool {
        self.included.len() > 1
    }

    fn expand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_expand() {
            return false;
        }
        let i = rng.gen_range(0..self.excluded.len());
        let moved = self.excluded.remove(i);
        self.included.push(moved);
        true
    }

    fn reduce<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.can_reduce() {
            return false;
        }
        let i = rng.gen_range(0..self.included.len());
        let moved = self.included.remove(i);
        self.excluded.push(moved);
        true
    }

    fn contains(&self, value: &T) -> bool {
        self.included.contains(value)
    }

    fn is_inverted(&self) -> bool {
        self.inverted
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }
}

impl<T: fmt::Display> fmt::Display for UnorderedSubset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            write!(f, "!")?;
        }
        write!(f, "[")?;
        for (i, v) in self.included.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn countries() -> UnorderedSubset<String> {
        UnorderedSubset::new(
            ["USA", "KEN", "CHN", "GBR"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn test_full_matches_everything() {
        let s = countries();
        assert!(s.matches(&"KEN".to_string()));
        assert!(!s.matches(&"FRA".to_string()));
        assert!(!s.can_expand());
    }

    #[test]
    fn test_reduce_never_empties() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut s = countries();
        while s.reduce(&mut rng) {}
        assert_eq!(s.included().len(), 1);
        assert_eq!(s.excluded().len(), 3);
        assert!(!s.can_reduce());
    }

    #[test]
    fn test_expand_reports_change() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut s = countries();
        assert!(s.reduce(&mut rng));
        assert!(s.expand(&mut rng));
        assert_eq!(s.included().len(), 4);
        assert!(!s.expand(&mut rng));
    }

    #[test]
    fn test_set_values_ignores_unknown_codes() {
        let mut s = countries();
        let result = s.set_values(&["USA".to_string(), "FRA".to_string()]);
        assert_eq!(result, Ok(Assignment::Clamped));
        assert_eq!(s.included(), &["USA".to_string()]);

        assert_eq!(
            s.set_values(&["FRA".to_string()]),
            Err(DomainError::EmptySelection)
        );
        assert_eq!(s.included(), &["USA".to_string()]);
    }

    #[test]
    fn test_random_init_is_never_empty() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut s = countries();
        for _ in 0..100 {
            s.init_random(&mut rng);
            assert!(!s.included().is_empty());
            assert_eq!(s.included().len() + s.excluded().len(), 4);
        }
    }
}
