//! Event Query Search - Evolutionary discovery of event-count predictors.
//!
//! A query is a conjunction of attribute predicates over coded events plus a
//! time shift and a visibility offset. Evaluated around an anchor date it
//! yields a count series, which a predictor turns into a forecast that is
//! scored against a reference series. The crate searches for queries whose
//! counts best predict that reference.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, event and report types
//! - `compute`: Series, attribute domains, queries, scoring and search
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use event_query_search::{
//!     compute::{Corpus, LocalCorpus, load_reference_series, run_search, ResolutionUnit},
//!     schema::SearchConfig,
//! };
//!
//! let config = SearchConfig::default();
//! let corpus = Arc::new(Corpus::load_jsonl("events.jsonl").unwrap());
//! let reference = load_reference_series("cases.jsonl", 1, ResolutionUnit::Days).unwrap();
//!
//! let outcome = run_search(&config, &LocalCorpus::new(corpus), &reference, "cases").unwrap();
//! println!("Best score: {}", outcome.best_score);
//! println!("{}", outcome.best_summary);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{Query, Scorer, SmartScore, TimeSeries, run_all, run_search};
pub use schema::{ExplorationOutcome, RunSpec, SearchConfig};
