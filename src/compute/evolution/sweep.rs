//! Exhaustive sweep over an integer `(min, max)` pair domain.

use crate::compute::Query;

use super::iterator::{IterationState, QueryIterator};

/// Installs a swept `(min, max)` pair onto a query. Returns false to stop the sweep.
pub type SweepInstaller = Box<dyn Fn(&mut Query, i64, i64) -> bool + Send + Sync>;

/// Enumerates every pair `floor <= min <= max <= ceiling`, `max` varying fastest.
pub struct IntegerSweep {
    state: IterationState,
    base: Query,
    floor: i64,
    ceiling: i64,
    min: i64,
    max: i64,
    installer: SweepInstaller,
}

impl IntegerSweep {
    pub fn new(floor: i64, ceiling: i64, base: Query, installer: SweepInstaller) -> Self {
        Self {
            state: IterationState::default(),
            base,
            floor,
            ceiling,
            min: floor,
            max: floor - 1,
            installer,
        }
    }

    /// Sweep contiguous root-code ranges `min..=max` over codes 1 to 20.
    pub fn root_codes(base: Query) -> Self {
        Self::new(
            1,
            20,
            base,
            Box::new(|query, min, max| {
                query
                    .root_code
                    .set_positions((min - 1) as usize, max as usize)
                    .is_ok()
            }),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.state.label = label.into();
        self
    }

    /// Current `(min, max)` pair.
    pub fn current(&self) -> (i64, i64) {
        (self.min, self.max)
    }

    fn increment(&mut self) -> bool {
        self.max += 1;
        if self.max > self.ceiling {
            self.min += 1;
            if self.min > self.ceiling {
                return false;
            }
            self.max = self.min;
        }
        true
    }
}

impl QueryIterator for IntegerSweep {
    fn state(&self) -> &IterationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut IterationState {
        &mut self.state
    }

    fn next_query(&mut self) -> Option<Query> {
        if !self.increment() {
            return None;
        }
        let mut query = self.base.clone();
        query.renew_order();
        (self.installer)(&mut query, self.min, self.max).then_some(query)
    }

    fn total_iterations(&self) -> Option<u64> {
        let n = (self.ceiling - self.floor + 1).max(0) as u64;
        Some(n * (n + 1) / 2)
    }

    fn rewind(&mut self) -> bool {
        self.min = self.floor;
        self.max = self.floor - 1;
        self.state.current = 0;
        self.state.last_notable = 0;
        true
    }

    fn apply_current(&self, query: &mut Query) -> bool {
        (self.installer)(query, self.min, self.max)
    }
}
