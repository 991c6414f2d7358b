//! Multi-generation driver around an [`Ecosystem`].

use log::debug;

use crate::compute::{Query, SmartScore};

use super::ecosystem::Ecosystem;
use super::iterator::{IterationState, QueryIterator};

/// Runs an ecosystem for a fixed number of generations, evolving between them.
pub struct GenerationLoop {
    state: IterationState,
    ecosystem: Ecosystem,
    generations: usize,
    completed: usize,
}

impl GenerationLoop {
    pub fn new(ecosystem: Ecosystem, generations: usize) -> Self {
        Self {
            state: IterationState::default(),
            ecosystem,
            generations,
            completed: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.state.label = label.into();
        self
    }

    pub fn ecosystem(&self) -> &Ecosystem {
        &self.ecosystem
    }

    /// Generations fully handed out so far.
    pub fn completed_generations(&self) -> usize {
        self.completed
    }
}

impl QueryIterator for GenerationLoop {
    fn state(&self) -> &IterationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut IterationState {
        &mut self.state
    }

    fn next_query(&mut self) -> Option<Query> {
        loop {
            if self.completed >= self.generations {
                return None;
            }
            if let Some(query) = self.ecosystem.next_query() {
                return Some(query);
            }
            self.completed += 1;
            if self.completed >= self.generations {
                debug!("{}: all {} generations done", self.state.label, self.generations);
                return None;
            }
            self.ecosystem.evolve();
        }
    }

    fn total_iterations(&self) -> Option<u64> {
        Some((self.generations * self.ecosystem.size()) as u64)
    }

    fn record_score(&mut self, score: &SmartScore, query: Query) {
        self.ecosystem.record_score(score, query);
    }
}
