//! Configuration types for query search runs.
//!
//! A [`SearchConfig`] is an immutable value threaded through query
//! construction, evaluation, mutation and scoring. Nothing in the engine reads
//! ambient global state.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::compute::ResolutionUnit;

/// Query fields that a mutator selector can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryField {
    Actor1CountryCodes,
    Actor2CountryCodes,
    GoldsteinScale,
    AverageTone,
    RootCode,
    QuadClass,
    LatLon,
}

/// A field and its relative selection weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWeight {
    pub field: QueryField,
    pub weight: u32,
}

/// Picks exactly one field per mutation round, proportionally to weight.
///
/// A template may carry several selectors; each one contributes a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MutatorSelector {
    pub fields: Vec<FieldWeight>,
}

/// Which attributes a query matches on and how it mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTemplate {
    pub match_goldstein_scale: bool,
    pub match_root_code: bool,
    pub match_average_tone: bool,
    pub match_quad_class: bool,
    pub match_lat_lon: bool,
    /// Permitted actor-1 country codes. Matching is enabled when non-empty.
    pub actor1_country_codes: Vec<String>,
    /// Permitted actor-2 country codes. Matching is enabled when non-empty.
    pub actor2_country_codes: Vec<String>,
    pub mutator_selectors: Vec<MutatorSelector>,
    /// Probability per mutation of nudging the temporal shift.
    pub time_shift_probability: f64,
    /// Temporal shift bounds in hours.
    pub shift_bounds: (i64, i64),
    /// Visibility-window offset bounds in hours.
    pub viz_offset_bounds: (i64, i64),
    /// Chance a mutated copy is replaced by a fresh random query.
    pub new_random_probability: f64,
    /// Chance a mutation removes one child.
    pub child_removal_probability: f64,
    /// Probability of expanding when a primitive can both expand and reduce.
    pub expand_bias: f64,
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self {
            match_goldstein_scale: true,
            match_root_code: true,
            match_average_tone: false,
            match_quad_class: false,
            match_lat_lon: false,
            actor1_country_codes: Vec::new(),
            actor2_country_codes: Vec::new(),
            mutator_selectors: vec![MutatorSelector {
                fields: vec![
                    FieldWeight {
                        field: QueryField::GoldsteinScale,
                        weight: 1,
                    },
                    FieldWeight {
                        field: QueryField::RootCode,
                        weight: 1,
                    },
                ],
            }],
            time_shift_probability: 0.1,
            shift_bounds: default_shift_bounds(),
            viz_offset_bounds: default_viz_offset_bounds(),
            new_random_probability: default_new_random_probability(),
            child_removal_probability: default_child_removal_probability(),
            expand_bias: default_expand_bias(),
        }
    }
}

fn default_shift_bounds() -> (i64, i64) {
    (0, 168)
}
fn default_viz_offset_bounds() -> (i64, i64) {
    (48, 168)
}
fn default_new_random_probability() -> f64 {
    0.1
}
fn default_child_removal_probability() -> f64 {
    0.1
}
fn default_expand_bias() -> f64 {
    0.5
}

impl QueryTemplate {
    pub fn match_actor1(&self) -> bool {
        !self.actor1_country_codes.is_empty()
    }

    pub fn match_actor2(&self) -> bool {
        !self.actor2_country_codes.is_empty()
    }
}

/// Training and forecast horizons, in days relative to an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// History length (negative).
    #[serde(default = "default_t_min")]
    pub t_min: i64,
    /// Training forecast horizon.
    #[serde(default = "default_t_max")]
    pub t_max: i64,
    /// Horizon of the final forecast from the output start.
    #[serde(default = "default_t_max_pred")]
    pub t_max_pred: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            t_min: default_t_min(),
            t_max: default_t_max(),
            t_max_pred: default_t_max_pred(),
        }
    }
}

fn default_t_min() -> i64 {
    -35
}
fn default_t_max() -> i64 {
    14
}
fn default_t_max_pred() -> i64 {
    7
}

/// How a query's history is turned into a forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum PredictionMethod {
    /// Forecast is the query's own output after the anchor.
    #[default]
    Raw,
    /// Least-squares fit of target on driver over the history.
    LinearRegression,
    /// History driver values, for in-sample correlation.
    TestBaseValues,
    /// Out-of-process predictor.
    Script {
        interpreter: String,
        script: PathBuf,
        #[serde(default)]
        working_dir: Option<PathBuf>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

/// Scorer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScoreMethod {
    Rmse,
    #[default]
    NrmseMean,
    NrmseMinMax,
    NrmseStd,
    InputCorrelation,
    InputCorrelationTrimmed,
    InputCorrelationPositiveOnly,
    CorrelationPositiveOnly,
}

/// Ecosystem sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    #[serde(default = "default_population_size")]
    pub size: usize,
    #[serde(default = "default_survivors")]
    pub survivors: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            survivors: default_survivors(),
            generations: default_generations(),
        }
    }
}

fn default_population_size() -> usize {
    80
}
fn default_survivors() -> usize {
    25
}
fn default_generations() -> usize {
    10
}

/// Early-termination thresholds for the exploration loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BailoutConfig {
    /// Stop once this many candidates pass without improvement.
    #[serde(default)]
    pub stale_iterations: Option<u64>,
    /// Stop once this many seconds pass without improvement.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: Option<u64>,
}

impl Default for BailoutConfig {
    fn default() -> Self {
        Self {
            stale_iterations: None,
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> Option<u64> {
    Some(1800)
}

/// When scoring anchors fall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Anchor of the final forecast.
    #[serde(default = "default_output_start")]
    pub output_start: NaiveDateTime,
    /// Offsets in days; each yields an anchor at `output_start - (t_max + d)`.
    #[serde(default = "default_test_days")]
    pub test_days: Vec<i64>,
    /// Bucket width of every evaluated series.
    #[serde(default = "default_resolution")]
    pub resolution: i64,
    #[serde(default)]
    pub unit: ResolutionUnit,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            output_start: default_output_start(),
            test_days: default_test_days(),
            resolution: default_resolution(),
            unit: ResolutionUnit::default(),
        }
    }
}

fn default_output_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 8, 4)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}
fn default_test_days() -> Vec<i64> {
    vec![1, 14, 28, 42]
}
fn default_resolution() -> i64 {
    1
}

impl ScheduleConfig {
    /// Scoring anchors derived from the test-day offsets.
    pub fn anchors(&self, window: &WindowConfig) -> Vec<NaiveDateTime> {
        self.test_days
            .iter()
            .map(|d| self.output_start - TimeDelta::days(window.t_max + d))
            .collect()
    }
}

/// Top-level configuration of one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub template: QueryTemplate,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub prediction_method: PredictionMethod,
    #[serde(default)]
    pub score_method: ScoreMethod,
    #[serde(default)]
    pub population: PopulationConfig,
    #[serde(default)]
    pub bailout: BailoutConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Bucket events by the time they were added instead of when they happened.
    #[serde(default)]
    pub use_date_added: bool,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// A reference series to search against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    /// JSON-lines file of `{"time", "value"}` points, bucketed by day.
    pub ground_truth: PathBuf,
}

/// Everything the CLI needs for a batch of independent runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub config: SearchConfig,
    /// JSON-lines event corpus.
    pub corpus: PathBuf,
    pub datasets: Vec<DatasetSpec>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_max_concurrent_runs() -> usize {
    4
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            config: SearchConfig::default(),
            corpus: PathBuf::from("events.jsonl"),
            datasets: vec![DatasetSpec {
                name: "reference".to_string(),
                ground_truth: PathBuf::from("reference.json"),
            }],
            output_dir: default_output_dir(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl SearchConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.population;
        if p.size == 0 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if p.survivors == 0 || p.survivors > p.size {
            return Err(ConfigError::InvalidSurvivors {
                survivors: p.survivors,
                size: p.size,
            });
        }
        if p.generations == 0 {
            return Err(ConfigError::NoGenerations);
        }
        if self.window.t_min > self.window.t_max {
            return Err(ConfigError::InvalidWindow {
                t_min: self.window.t_min,
                t_max: self.window.t_max,
            });
        }
        if self.schedule.resolution <= 0 {
            return Err(ConfigError::InvalidResolution(self.schedule.resolution));
        }

        let t = &self.template;
        let check_bounds = |bounds: (i64, i64), name: &str| {
            if bounds.0 > bounds.1 {
                Err(ConfigError::InvalidBounds(format!(
                    "{} min ({}) > max ({})",
                    name, bounds.0, bounds.1
                )))
            } else {
                Ok(())
            }
        };
        check_bounds(t.shift_bounds, "shift")?;
        check_bounds(t.viz_offset_bounds, "viz_offset")?;

        let check_probability = |p: f64, name: &str| {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability(format!("{} = {}", name, p)))
            }
        };
        check_probability(t.time_shift_probability, "time_shift_probability")?;
        check_probability(t.new_random_probability, "new_random_probability")?;
        check_probability(t.child_removal_probability, "child_removal_probability")?;
        check_probability(t.expand_bias, "expand_bias")?;

        for selector in &t.mutator_selectors {
            if selector.fields.is_empty() || selector.fields.iter().all(|f| f.weight == 0) {
                return Err(ConfigError::EmptySelector);
            }
        }

        if let PredictionMethod::Script { script, .. } = &self.prediction_method
            && script.as_os_str().is_empty()
        {
            return Err(ConfigError::MissingScript);
        }
        Ok(())
    }
}

impl RunSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        if self.datasets.is_empty() {
            return Err(ConfigError::NoDatasets);
        }
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be non-zero")]
    PopulationTooSmall,
    #[error("Survivor count {survivors} must be in 1..={size}")]
    InvalidSurvivors { survivors: usize, size: usize },
    #[error("Generation count must be non-zero")]
    NoGenerations,
    #[error("Window t_min ({t_min}) must not exceed t_max ({t_max})")]
    InvalidWindow { t_min: i64, t_max: i64 },
    #[error("Resolution must be positive, got {0}")]
    InvalidResolution(i64),
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
    #[error("Probability out of range: {0}")]
    InvalidProbability(String),
    #[error("Mutator selector needs at least one field with non-zero weight")]
    EmptySelector,
    #[error("Script predictor requires a script path")]
    MissingScript,
    #[error("Run specification names no datasets")]
    NoDatasets,
    #[error("max_concurrent_runs must be non-zero")]
    NoWorkers,
}
