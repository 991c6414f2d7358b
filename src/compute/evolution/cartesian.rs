//! Cartesian composition of sub-iterators.

use log::debug;

use crate::compute::{Query, SmartScore};

use super::SearchError;
use super::iterator::{IterationState, QueryIterator};

/// Odometer over an ordered list of sub-iterators.
///
/// The last sub-iterator turns fastest. When one is exhausted it is rewound
/// and the one before it advances; exhausting the first ends the composition.
/// Every candidate is `base` with each sub-iterator's current value applied.
pub struct Cartesian {
    state: IterationState,
    base: Query,
    iterators: Vec<Box<dyn QueryIterator>>,
    started: bool,
    /// Sub-iterator that most recently produced a value.
    current: usize,
}

impl Cartesian {
    pub fn new(base: Query, iterators: Vec<Box<dyn QueryIterator>>) -> Result<Self, SearchError> {
        if iterators.is_empty() {
            return Err(SearchError::NoIterators);
        }
        let current = iterators.len() - 1;
        Ok(Self {
            state: IterationState::default(),
            base,
            iterators,
            started: false,
            current,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.state.label = label.into();
        self
    }

    fn turn(&mut self) -> bool {
        if !self.started {
            self.started = true;
            for (i, it) in self.iterators.iter_mut().enumerate() {
                if it.next().is_none() {
                    debug!("sub-iterator {} is empty", i);
                    return false;
                }
            }
            self.current = self.iterators.len() - 1;
            return true;
        }

        let mut i = self.iterators.len() - 1;
        loop {
            if self.iterators[i].next().is_some() {
                self.current = i;
                return true;
            }
            if i == 0 {
                return false;
            }
            let it = &mut self.iterators[i];
            if !it.rewind() || it.next().is_none() {
                return false;
            }
            i -= 1;
        }
    }
}

impl QueryIterator for Cartesian {
    fn state(&self) -> &IterationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut IterationState {
        &mut self.state
    }

    fn next_query(&mut self) -> Option<Query> {
        if !self.turn() {
            return None;
        }
        let mut query = self.base.clone();
        query.renew_order();
        for it in &self.iterators {
            if !it.apply_current(&mut query) {
                return None;
            }
        }
        Some(query)
    }

    fn total_iterations(&self) -> Option<u64> {
        self.iterators
            .iter()
            .map(|it| it.total_iterations())
            .product()
    }

    fn record_score(&mut self, score: &SmartScore, query: Query) {
        self.iterators[self.current].record_score(score, query);
    }

    fn rewind(&mut self) -> bool {
        self.started = false;
        self.state.current = 0;
        self.state.last_notable = 0;
        self.iterators.iter_mut().all(|it| it.rewind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::IntegerSweep;
    use crate::schema::QueryTemplate;

    fn base() -> Query {
        Query::full(-2, 2, &QueryTemplate::default())
    }

    fn root_sweep(floor: i64, ceiling: i64) -> Box<dyn QueryIterator> {
        Box::new(IntegerSweep::new(
            floor,
            ceiling,
            base(),
            Box::new(|q, min, max| {
                q.root_code
                    .set_positions((min - 1) as usize, max as usize)
                    .is_ok()
            }),
        ))
    }

    fn quad_sweep() -> Box<dyn QueryIterator> {
        Box::new(IntegerSweep::new(
            1,
            4,
            base(),
            Box::new(|q, min, max| q.quad_class.set_values(min, max).is_ok()),
        ))
    }

    #[test]
    fn test_product_of_counts() {
        let mut cartesian = Cartesian::new(base(), vec![root_sweep(1, 3), quad_sweep()]).unwrap();
        assert_eq!(cartesian.total_iterations(), Some(60));
        let mut n = 0;
        while cartesian.next().is_some() {
            n += 1;
        }
        assert_eq!(n, 60);
    }

    #[test]
    fn test_last_iterator_turns_fastest() {
        let mut cartesian = Cartesian::new(base(), vec![root_sweep(1, 2), quad_sweep()]).unwrap();
        let first = cartesian.next().unwrap();
        let second = cartesian.next().unwrap();
        assert_eq!(first.root_code.positions(), second.root_code.positions());
        assert_eq!((first.quad_class.min(), first.quad_class.max()), (1, 1));
        assert_eq!((second.quad_class.min(), second.quad_class.max()), (1, 2));

        // Ten quad-class pairs per root-code pair.
        cartesian.advance(8);
        let eleventh = cartesian.next().unwrap();
        assert_eq!(eleventh.root_code.positions(), (0, 2));
        assert_eq!((eleventh.quad_class.min(), eleventh.quad_class.max()), (1, 1));
    }

    #[test]
    fn test_empty_composition_is_rejected() {
        assert!(matches!(
            Cartesian::new(base(), Vec::new()),
            Err(SearchError::NoIterators)
        ));
    }
}
