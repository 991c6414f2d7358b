//! Candidate generation and the search loop.
//!
//! Every source of candidate queries implements [`QueryIterator`]:
//!
//! - [`Ecosystem`]: one population, handed out in order, evolved on demand
//! - [`GenerationLoop`]: runs an ecosystem for a fixed number of generations
//! - [`IntegerSweep`]: exhaustive sweep over `(min, max)` integer pairs
//! - [`Cartesian`]: odometer composition of other iterators
//!
//! [`Explorer`] pulls candidates from any of them, scores each against the
//! reference series and keeps the best, stopping on exhaustion, staleness or
//! timeout.

mod cartesian;
mod ecosystem;
mod explorer;
mod generations;
mod iterator;
mod sweep;

pub use cartesian::Cartesian;
pub use ecosystem::Ecosystem;
pub use explorer::{Explorer, ProgressCallback, TestCriterion};
pub use generations::GenerationLoop;
pub use iterator::{IterationState, QueryIterator};
pub use sweep::{IntegerSweep, SweepInstaller};

use std::path::PathBuf;

use thiserror::Error;

use crate::compute::CorpusError;
use crate::schema::ConfigError;

/// Errors raised while setting up or running a search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("At most one match-all seed is allowed, got {0}")]
    MultipleMatchAll(usize),

    #[error("Cartesian composition needs at least one iterator")]
    NoIterators,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize outcome: {0}")]
    Json(#[from] serde_json::Error),
}
