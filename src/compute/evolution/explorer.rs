//! Driving loop: evaluate, score and track the best candidate.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::compute::corpus::CorpusProvider;
use crate::compute::predictor;
use crate::compute::query::EvalSettings;
use crate::compute::scorer::{self, Comparison, Scorer};
use crate::compute::series::{TimeSeries, ZeroIndexedSeries};
use crate::compute::{Query, SmartScore};
use crate::schema::{
    ExplorationOutcome, IterationRecord, PredictionMethod, SearchConfig, StopReason, TestResult,
};

use super::iterator::QueryIterator;

/// Called after every evaluated candidate.
pub type ProgressCallback = Box<dyn Fn(&IterationRecord) + Send + Sync>;

/// A held-out reference window a new best query is re-checked against.
#[derive(Debug, Clone)]
pub struct TestCriterion {
    pub name: String,
    pub anchor: NaiveDateTime,
    pub reference: ZeroIndexedSeries,
}

impl TestCriterion {
    /// `reference` lifted over `[t_min, t_max)` around `anchor`.
    pub fn lifted(
        name: impl Into<String>,
        reference: &TimeSeries,
        anchor: NaiveDateTime,
        t_min: i64,
        t_max: i64,
    ) -> Self {
        Self {
            name: name.into(),
            anchor,
            reference: reference.lift(anchor, t_min, t_max).into_series(),
        }
    }
}

/// Evaluates candidates from an iterator until it runs dry or a bailout fires.
pub struct Explorer<'a> {
    config: &'a SearchConfig,
    corpus: &'a dyn CorpusProvider,
    scorer: &'a Scorer,
    tests: Vec<TestCriterion>,
    progress: Option<ProgressCallback>,
}

impl<'a> Explorer<'a> {
    pub fn new(config: &'a SearchConfig, corpus: &'a dyn CorpusProvider, scorer: &'a Scorer) -> Self {
        Self {
            config,
            corpus,
            scorer,
            tests: Vec::new(),
            progress: None,
        }
    }

    pub fn with_tests(mut self, tests: Vec<TestCriterion>) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn settings(&self, t_zero: NaiveDateTime) -> EvalSettings<'a> {
        EvalSettings {
            template: &self.config.template,
            t_zero,
            resolution: self.config.schedule.resolution,
            unit: self.config.schedule.unit,
            use_date_added: self.config.use_date_added,
        }
    }

    /// Evaluate `query` at every scoring anchor. Failed anchors are left out.
    pub fn evaluate(&self, query: &mut Query) -> BTreeMap<NaiveDateTime, ZeroIndexedSeries> {
        query.reset_returned();
        let mut results = BTreeMap::new();
        for anchor in self.scorer.anchors() {
            match self.corpus.evaluate(query, &self.settings(anchor)) {
                Ok(series) => {
                    results.insert(anchor, series.into_series());
                }
                Err(e) => warn!("evaluation at {} failed: {}", anchor, e),
            }
        }
        results
    }

    pub fn score(&self, query: &mut Query) -> SmartScore {
        let results = self.evaluate(query);
        self.scorer.score(&results, &query.prediction_method)
    }

    /// Re-run `best` against every held-out window.
    pub fn run_tests(&self, best: &Query, iteration: u64) -> Vec<TestResult> {
        let predictor = predictor::for_method(&best.prediction_method);
        let mut out = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let mut query = best.blank_clone();
            let actual = if query.prediction_method == PredictionMethod::TestBaseValues {
                test.reference.base_values()
            } else {
                test.reference.predictions()
            };
            query.t_max = actual.len() as i64;

            let predicted = self
                .corpus
                .evaluate(&mut query, &self.settings(test.anchor))
                .map_err(|e| e.to_string())
                .and_then(|series| {
                    scorer::predict(predictor.as_ref(), &series.into_series(), &test.reference)
                        .map_err(|e| e.to_string())
                });
            let (predicted, score) = match predicted {
                Ok(p) => {
                    let s = self.scorer.score_values(actual, &p);
                    (p, Some(s))
                }
                Err(e) => {
                    warn!("test {} failed: {}", test.name, e);
                    (Vec::new(), None)
                }
            };
            if let Some(s) = score {
                debug!("test {} at iteration {} scored {}", test.name, iteration, s);
            }
            out.push(TestResult {
                criterion: test.name.clone(),
                iteration,
                anchor: test.anchor,
                actual: actual.to_vec(),
                predicted,
                score,
            });
        }
        out
    }

    /// Drive `iterator` to completion or bailout.
    ///
    /// `seed` is reported as the best query if no candidate is ever scored.
    pub fn execute(&self, iterator: &mut dyn QueryIterator, seed: Option<Query>) -> ExplorationOutcome {
        let started = Instant::now();
        let mut last_improvement = Instant::now();
        let mut best: Option<(SmartScore, Query)> = None;
        let mut history = Vec::new();
        let mut tests = Vec::new();
        let mut improvements = 0u64;
        let interval = self.config.bailout.interval_secs.map(Duration::from_secs);
        let total = iterator
            .total_iterations()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into());

        let stop_reason = loop {
            if let Some(limit) = self.config.bailout.stale_iterations
                && iterator.since_last_notable() >= limit
            {
                info!(
                    "{}: no improvement in {} candidates, stopping",
                    iterator.label(),
                    limit
                );
                break StopReason::Stale;
            }
            let Some(mut candidate) = iterator.next() else {
                break StopReason::Exhausted;
            };
            let iteration = iterator.current_iteration();
            debug!(
                "{}: iteration {} of {} ({} since last best)",
                iterator.label(),
                iteration,
                total,
                iterator.since_last_notable()
            );

            let score = self.score(&mut candidate);
            let improved = match &best {
                None => true,
                Some((best_score, _)) => score.is_better(best_score) == Comparison::Better,
            };
            if improved {
                let summary = candidate.summary_of_criteria(&self.config.template);
                info!(
                    "{}: new best {} at iteration {}\n{}",
                    iterator.label(),
                    score,
                    iteration,
                    summary
                );
                best = Some((score, candidate.blank_clone()));
                tests.extend(self.run_tests(&candidate, iteration));
                improvements += 1;
                iterator.set_notable();
                last_improvement = Instant::now();
            }
            iterator.record_score(&score, candidate);

            let record = IterationRecord {
                iteration,
                score,
                best_score: best.as_ref().map_or(score, |(s, _)| *s),
                improved,
            };
            if let Some(callback) = &self.progress {
                callback(&record);
            }
            history.push(record);

            if let Some(limit) = interval
                && last_improvement.elapsed() > limit
            {
                info!(
                    "{}: more than {:?} since last improvement, stopping",
                    iterator.label(),
                    limit
                );
                break StopReason::Timeout;
            }
        };

        let (best_score, best_query) = match best {
            Some((score, query)) => (score, Some(query)),
            None => (SmartScore::NotANumber, seed),
        };
        let best_summary = best_query
            .as_ref()
            .map(|q| q.summary_of_criteria(&self.config.template).to_string())
            .unwrap_or_default();
        info!(
            "{}: finished ({:?}) after {} candidates, best {}",
            iterator.label(),
            stop_reason,
            history.len(),
            best_score
        );

        ExplorationOutcome {
            label: iterator.label().to_string(),
            best_query,
            best_score,
            best_summary,
            stop_reason,
            iterations: history.len() as u64,
            improvements,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            history,
            tests,
        }
    }
}
