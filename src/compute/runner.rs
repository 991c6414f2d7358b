//! Wiring a configuration, a corpus and a reference series into a search.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use super::corpus::{Corpus, CorpusProvider, LocalCorpus, load_reference_series};
use super::domain::InitMethod;
use super::evolution::{Ecosystem, Explorer, GenerationLoop, SearchError, TestCriterion};
use super::query::Query;
use super::scorer::Scorer;
use super::series::{ResolutionUnit, TimeSeries};
use crate::schema::{ExplorationOutcome, RunSpec, SearchConfig};

/// Outcome of one data set in a batch, keyed by data-set name.
pub type DatasetOutcome = (String, Result<ExplorationOutcome, SearchError>);

/// Held-out windows: one `TEST_<date>` per anchor plus the forward `Result` window.
pub fn test_criteria(
    config: &SearchConfig,
    reference: &TimeSeries,
    anchors: &[NaiveDateTime],
) -> Vec<TestCriterion> {
    let window = &config.window;
    let mut tests: Vec<TestCriterion> = anchors
        .iter()
        .map(|&anchor| {
            TestCriterion::lifted(
                format!("TEST_{}", anchor.format("%Y-%m-%d")),
                reference,
                anchor,
                window.t_min,
                window.t_max,
            )
        })
        .collect();
    tests.push(TestCriterion::lifted(
        "Result",
        reference,
        config.schedule.output_start,
        window.t_min,
        window.t_max_pred,
    ));
    tests
}

/// Starting population: one match-all query, one full query, the rest random.
pub fn initial_seeds(config: &SearchConfig, rng: &mut StdRng) -> Vec<Query> {
    let (t_min, t_max) = (config.window.t_min, config.window.t_max);
    let mut seeds = Vec::with_capacity(config.population.size);
    for mut seed in [
        Query::match_all(t_min, t_max, &config.template),
        Query::full(t_min, t_max, &config.template),
    ] {
        seed.prediction_method = config.prediction_method.clone();
        seeds.push(seed);
    }
    while seeds.len() < config.population.size {
        seeds.push(Query::new(
            InitMethod::Random,
            t_min,
            t_max,
            config.prediction_method.clone(),
            &config.template,
            rng,
        ));
    }
    seeds
}

/// Run one evolutionary search of `corpus` against `reference`.
pub fn run_search(
    config: &SearchConfig,
    corpus: &dyn CorpusProvider,
    reference: &TimeSeries,
    label: &str,
) -> Result<ExplorationOutcome, SearchError> {
    config.validate()?;
    let window = &config.window;
    let anchors = config.schedule.anchors(window);
    info!(
        "{}: scoring at {} anchors, window [{}, {}) days",
        label,
        anchors.len(),
        window.t_min,
        window.t_max
    );

    let scorer = Scorer::with_reference(
        config.score_method,
        reference,
        window.t_min,
        window.t_max,
        &anchors,
    );
    let tests = test_criteria(config, reference, &anchors);

    let mut rng = StdRng::seed_from_u64(config.random_seed.unwrap_or_else(rand::random));
    let seeds = initial_seeds(config, &mut rng);
    let ecosystem = Ecosystem::new(seeds, config, rng)?.with_label(label);
    let mut generations =
        GenerationLoop::new(ecosystem, config.population.generations).with_label(label);

    let outcome = Explorer::new(config, corpus, &scorer)
        .with_tests(tests)
        .execute(&mut generations, None);
    Ok(outcome)
}

/// Run every data set of `spec` on a bounded worker pool, saving each outcome.
///
/// Setup failures (bad config, unreadable corpus, pool) abort the batch; a
/// failing data set only fails its own entry.
pub fn run_all(spec: &RunSpec) -> Result<Vec<DatasetOutcome>, SearchError> {
    spec.validate()?;
    let corpus = Arc::new(Corpus::load_jsonl(&spec.corpus)?);
    info!(
        "running {} data sets over {} events, {} at a time",
        spec.datasets.len(),
        corpus.len(),
        spec.max_concurrent_runs
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(spec.max_concurrent_runs)
        .build()
        .map_err(|e| SearchError::ThreadPool(e.to_string()))?;

    let outcomes = pool.install(|| {
        spec.datasets
            .par_iter()
            .map(|dataset| {
                let provider = LocalCorpus::new(Arc::clone(&corpus));
                let result = load_reference_series(&dataset.ground_truth, 1, ResolutionUnit::Days)
                    .map_err(SearchError::from)
                    .and_then(|reference| {
                        run_search(&spec.config, &provider, &reference, &dataset.name)
                    })
                    .and_then(|outcome| {
                        save_outcome(&spec.output_dir, &dataset.name, &outcome)?;
                        Ok(outcome)
                    });
                if let Err(e) = &result {
                    warn!("{}: run failed: {}", dataset.name, e);
                }
                (dataset.name.clone(), result)
            })
            .collect()
    });
    Ok(outcomes)
}

/// Write `outcome` as `<dir>/<name>/outcome.json`.
pub fn save_outcome(
    dir: &Path,
    name: &str,
    outcome: &ExplorationOutcome,
) -> Result<PathBuf, SearchError> {
    let folder = dir.join(name);
    fs::create_dir_all(&folder).map_err(|source| SearchError::Output {
        path: folder.clone(),
        source,
    })?;
    let path = folder.join("outcome.json");
    let json = serde_json::to_string_pretty(outcome)?;
    fs::write(&path, json).map_err(|source| SearchError::Output {
        path: path.clone(),
        source,
    })?;
    info!("{}: wrote {}", name, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::SmartScore;
    use crate::schema::{PopulationConfig, StopReason};
    use chrono::NaiveDate;

    fn day(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_criteria_names_and_forward_window() {
        let config = SearchConfig::default();
        let reference = TimeSeries::new(day(1, 1), 1, ResolutionUnit::Days);
        let anchors = vec![day(3, 1), day(3, 15)];
        let tests = test_criteria(&config, &reference, &anchors);

        let names: Vec<&str> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["TEST_2020-03-01", "TEST_2020-03-15", "Result"]);
        let forward = &tests[2];
        assert_eq!(forward.anchor, config.schedule.output_start);
        assert_eq!(
            forward.reference.predictions().len() as i64,
            config.window.t_max_pred
        );
    }

    #[test]
    fn test_initial_seeds_fill_population() {
        let config = SearchConfig {
            population: PopulationConfig {
                size: 9,
                survivors: 3,
                generations: 1,
            },
            ..Default::default()
        };
        let seeds = initial_seeds(&config, &mut StdRng::seed_from_u64(1));
        assert_eq!(seeds.len(), 9);
        assert_eq!(seeds.iter().filter(|q| q.all).count(), 1);
        assert!(seeds.iter().all(|q| q.t_min == config.window.t_min));
    }

    #[test]
    fn test_run_search_rejects_invalid_config() {
        let mut config = SearchConfig::default();
        config.population.survivors = 0;
        let corpus = LocalCorpus::new(Arc::new(Corpus::from_events(Vec::new())));
        let reference = TimeSeries::new(day(1, 1), 1, ResolutionUnit::Days);
        assert!(matches!(
            run_search(&config, &corpus, &reference, "bad"),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_save_outcome_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ExplorationOutcome {
            label: "demo".into(),
            best_query: None,
            best_score: SmartScore::Error(1.5),
            best_summary: String::new(),
            stop_reason: StopReason::Exhausted,
            iterations: 0,
            improvements: 0,
            elapsed_seconds: 0.0,
            history: Vec::new(),
            tests: Vec::new(),
        };
        let path = save_outcome(dir.path(), "demo", &outcome).unwrap();
        assert_eq!(path, dir.path().join("demo").join("outcome.json"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"label\": \"demo\""));
    }
}
