//! Compute module - Query evaluation, scoring and search.

mod corpus;
pub mod domain;
pub mod evolution;
mod predictor;
mod query;
mod runner;
mod scorer;
mod series;

pub use corpus::{Corpus, CorpusError, CorpusProvider, LocalCorpus, load_reference_series};
pub use predictor::{
    BaseValuesPredictor, LinearRegressionPredictor, PredictError, Predictor, RawPredictor,
    ScriptPredictor, for_method, parse_prediction,
};
pub use query::{EvalSettings, EventWeights, MAX_CHILDREN, Query, QueryFormatError, SHIFT_STEP_HOURS};
pub use runner::{DatasetOutcome, initial_seeds, run_all, run_search, save_outcome, test_criteria};
pub use scorer::{Comparison, Scorer, SmartScore, pearson, predict};
pub use series::{ResolutionUnit, TimeSeries, ZeroIndexedSeries};
