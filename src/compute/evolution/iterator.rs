//! Candidate iteration protocol shared by every search strategy.

use serde::{Deserialize, Serialize};

use crate::compute::{Query, SmartScore};

/// Counters every iterator carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationState {
    /// Calls to [`QueryIterator::next`] so far.
    pub current: u64,
    /// Value of `current` when the last improvement was flagged.
    pub last_notable: u64,
    /// Maximum number of candidates to hand out.
    pub limit: Option<u64>,
    pub label: String,
}

impl IterationState {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }
}

/// A source of candidate queries.
///
/// Strategies implement [`QueryIterator::next_query`]; the driving loop calls
/// [`QueryIterator::next`], which applies the shared counter and limit.
pub trait QueryIterator: Send {
    fn state(&self) -> &IterationState;

    fn state_mut(&mut self) -> &mut IterationState;

    /// Strategy-specific next candidate, `None` when exhausted.
    fn next_query(&mut self) -> Option<Query>;

    /// Candidates this iterator yields in total, if known.
    fn total_iterations(&self) -> Option<u64>;

    /// Attach a score to the candidate most recently handed out.
    ///
    /// `query` is that candidate after evaluation.
    fn record_score(&mut self, _score: &SmartScore, _query: Query) {}

    /// Return to the first value. Returns false if this iterator cannot restart.
    fn rewind(&mut self) -> bool {
        false
    }

    /// Install the current value onto `query`. Returns false if unsupported.
    fn apply_current(&self, _query: &mut Query) -> bool {
        false
    }

    /// Advance the counter and produce the next candidate.
    fn next(&mut self) -> Option<Query> {
        let state = self.state_mut();
        state.current += 1;
        if let Some(limit) = state.limit
            && state.current > limit
        {
            return None;
        }
        self.next_query()
    }

    /// Call [`QueryIterator::next`] `n` times; true if the last call produced a candidate.
    fn advance(&mut self, n: u64) -> bool {
        let mut produced = true;
        for _ in 0..n {
            produced = self.next().is_some();
        }
        produced
    }

    fn set_limit(&mut self, limit: Option<u64>) {
        self.state_mut().limit = limit;
    }

    /// Flag the current iteration as an improvement.
    fn set_notable(&mut self) {
        let state = self.state_mut();
        state.last_notable = state.current;
    }

    fn since_last_notable(&self) -> u64 {
        let state = self.state();
        state.current.saturating_sub(state.last_notable)
    }

    fn current_iteration(&self) -> u64 {
        self.state().current
    }

    fn label(&self) -> &str {
        &self.state().label
    }
}
