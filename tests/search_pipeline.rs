//! End-to-end search over a synthetic corpus whose root-code-5 events track
//! the reference series exactly.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use event_query_search::{
    compute::{
        Corpus, LocalCorpus, Query, ResolutionUnit, Scorer, SmartScore, TimeSeries,
        evolution::{Explorer, IntegerSweep, QueryIterator},
        load_reference_series, run_all, run_search,
    },
    schema::{
        BailoutConfig, DatasetSpec, Event, PopulationConfig, RunSpec, ScheduleConfig, ScoreMethod,
        SearchConfig, StopReason,
    },
};

const DAYS: i64 = 120;
const NOISE_PER_DAY: u64 = 2;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 5, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn signal(day: i64) -> u64 {
    1 + (day * 7 % 5) as u64
}

/// `signal(d)` root-code-5 events and a constant number of root-code-12 events per day.
fn events() -> Vec<Event> {
    let mut out = Vec::new();
    let mut id = 0;
    for d in 0..DAYS {
        let noon = start() + TimeDelta::days(d) + TimeDelta::hours(12);
        for (code, count) in [(5, signal(d)), (12, NOISE_PER_DAY)] {
            for _ in 0..count {
                let mut event = Event::at(id, noon);
                event.root_code = code;
                out.push(event);
                id += 1;
            }
        }
    }
    out
}

fn reference() -> TimeSeries {
    let mut series = TimeSeries::new(start(), 1, ResolutionUnit::Days);
    for d in 0..DAYS {
        series.add_counts_at(start() + TimeDelta::days(d), signal(d) as f64);
    }
    series
}

fn config() -> SearchConfig {
    SearchConfig {
        population: PopulationConfig {
            size: 12,
            survivors: 4,
            generations: 3,
        },
        bailout: BailoutConfig {
            stale_iterations: None,
            interval_secs: None,
        },
        schedule: ScheduleConfig {
            test_days: vec![1, 14],
            ..Default::default()
        },
        score_method: ScoreMethod::Rmse,
        random_seed: Some(42),
        ..Default::default()
    }
}

fn write_lines<T: serde::Serialize>(path: &Path, items: impl IntoIterator<Item = T>) {
    let mut file = fs::File::create(path).unwrap();
    for item in items {
        writeln!(file, "{}", serde_json::to_string(&item).unwrap()).unwrap();
    }
}

#[test]
fn test_generational_search_runs_to_exhaustion() {
    let config = config();
    let corpus = LocalCorpus::new(Arc::new(Corpus::from_events(events())));
    let outcome = run_search(&config, &corpus, &reference(), "synthetic").unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.iterations, 36);
    assert_eq!(outcome.history.len(), 36);
    assert!(outcome.improvements >= 1);
    assert!(outcome.best_query.is_some());

    // The best score is the lowest error seen.
    let lowest = outcome
        .history
        .iter()
        .map(|r| r.score.value())
        .fold(f64::INFINITY, f64::min);
    assert!(matches!(outcome.best_score, SmartScore::Error(_)));
    assert_eq!(outcome.best_score.value(), lowest);

    // Two anchor windows plus the forward window per improvement.
    assert_eq!(outcome.tests.len() as u64, outcome.improvements * 3);
    assert!(outcome.tests.iter().any(|t| t.criterion == "Result"));
    assert!(outcome.tests.iter().any(|t| t.criterion.starts_with("TEST_2020-07")));
}

#[test]
fn test_same_seed_same_outcome() {
    let config = config();
    let corpus = LocalCorpus::new(Arc::new(Corpus::from_events(events())));
    let a = run_search(&config, &corpus, &reference(), "a").unwrap();
    let b = run_search(&config, &corpus, &reference(), "b").unwrap();
    let scores = |o: &event_query_search::ExplorationOutcome| {
        o.history.iter().map(|r| r.score).collect::<Vec<_>>()
    };
    assert_eq!(scores(&a), scores(&b));
}

#[test]
fn test_root_code_sweep_finds_exact_match() {
    let config = config();
    let corpus = LocalCorpus::new(Arc::new(Corpus::from_events(events())));
    let window = &config.window;
    let anchors = config.schedule.anchors(window);
    let scorer = Scorer::with_reference(
        ScoreMethod::Rmse,
        &reference(),
        window.t_min,
        window.t_max,
        &anchors,
    );

    let base = Query::full(window.t_min, window.t_max, &config.template);
    let mut sweep = IntegerSweep::root_codes(base).with_label("roots");
    assert_eq!(sweep.total_iterations(), Some(210));

    let outcome = Explorer::new(&config, &corpus, &scorer).execute(&mut sweep, None);
    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.iterations, 210);
    assert_eq!(outcome.best_score, SmartScore::Error(0.0));

    let best = outcome.best_query.unwrap();
    let codes = best.root_code.matching_values();
    assert!(codes.contains(&5));
    assert!(!codes.contains(&12));
}

#[test]
fn test_stale_search_stops_early() {
    let mut config = config();
    config.bailout.stale_iterations = Some(5);
    // No events: every candidate scores the same, so only the first improves.
    let corpus = LocalCorpus::new(Arc::new(Corpus::from_events(Vec::new())));
    let outcome = run_search(&config, &corpus, &reference(), "empty").unwrap();

    assert_eq!(outcome.stop_reason, StopReason::Stale);
    assert_eq!(outcome.iterations, 6);
    assert_eq!(outcome.improvements, 1);
}

#[test]
fn test_run_all_writes_outcomes_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("events.jsonl");
    write_lines(&corpus_path, events());

    let reference_path = dir.path().join("reference.jsonl");
    write_lines(
        &reference_path,
        (0..DAYS).map(|d| {
            serde_json::json!({
                "time": start() + TimeDelta::days(d),
                "value": signal(d) as f64,
            })
        }),
    );
    let loaded = load_reference_series(&reference_path, 1, ResolutionUnit::Days).unwrap();
    assert_eq!(loaded.count_at_time(start()), signal(0) as f64);

    let mut config = config();
    config.population.generations = 1;
    let spec = RunSpec {
        config,
        corpus: corpus_path,
        datasets: vec![
            DatasetSpec {
                name: "good".into(),
                ground_truth: reference_path,
            },
            DatasetSpec {
                name: "missing".into(),
                ground_truth: dir.path().join("nope.jsonl"),
            },
        ],
        output_dir: dir.path().join("out"),
        max_concurrent_runs: 2,
    };

    let outcomes = run_all(&spec).unwrap();
    assert_eq!(outcomes.len(), 2);
    let good = outcomes.iter().find(|(n, _)| n == "good").unwrap();
    let missing = outcomes.iter().find(|(n, _)| n == "missing").unwrap();
    assert!(good.1.is_ok());
    assert!(missing.1.is_err());

    let written = dir.path().join("out").join("good").join("outcome.json");
    let text = fs::read_to_string(written).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["label"], "good");
    assert!(!dir.path().join("out").join("missing").exists());
}
