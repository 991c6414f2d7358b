//! Fitness scoring of query results against reference series.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::predictor::{self, Predictor};
use super::series::{TimeSeries, ZeroIndexedSeries};
use crate::schema::{PredictionMethod, ScoreMethod};

/// Fraction of the reference maximum below which trimmed correlation drops a point.
pub const TRIM_FRACTION: f64 = 0.05;

/// Outcome of comparing two scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Better,
    Equivalent,
    Worse,
    NotComparable,
}

/// A fitness value tagged with its comparison family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "value")]
pub enum SmartScore {
    /// Error magnitude; lower is better.
    Error(f64),
    /// Linear correlation; larger magnitude is better.
    Correlation(f64),
    /// Correlation with negatives folded to zero; higher is better.
    PositiveCorrelation(f64),
    /// No score could be computed.
    NotANumber,
}

impl SmartScore {
    /// Raw value, NaN for the sentinel.
    pub fn value(&self) -> f64 {
        match *self {
            Self::Error(v) | Self::Correlation(v) | Self::PositiveCorrelation(v) => v,
            Self::NotANumber => f64::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.value().is_nan()
    }

    /// Compare `self` against `other`.
    ///
    /// Scores of different families are not comparable. A NaN value never
    /// beats a real one and two NaNs are equivalent; the sentinel behaves as a
    /// NaN of every family.
    pub fn is_better(&self, other: &SmartScore) -> Comparison {
        let same_family = matches!(
            (self, other),
            (Self::Error(_), Self::Error(_))
                | (Self::Correlation(_), Self::Correlation(_))
                | (Self::PositiveCorrelation(_), Self::PositiveCorrelation(_))
                | (Self::NotANumber, _)
                | (_, Self::NotANumber)
        );
        if !same_family {
            return Comparison::NotComparable;
        }

        let (a, b) = (self.value(), other.value());
        match (a.is_nan(), b.is_nan()) {
            (true, true) => return Comparison::Equivalent,
            (true, false) => return Comparison::Worse,
            (false, true) => return Comparison::Better,
            (false, false) => {}
        }

        let ordering = match self {
            Self::Error(_) => b.total_cmp(&a),
            Self::Correlation(_) => a.abs().total_cmp(&b.abs()),
            Self::PositiveCorrelation(_) | Self::NotANumber => a.total_cmp(&b),
        };
        match ordering {
            Ordering::Greater => Comparison::Better,
            Ordering::Equal => Comparison::Equivalent,
            Ordering::Less => Comparison::Worse,
        }
    }

    /// Total "higher is better" key used to rank a population.
    pub fn fitness_key(&self) -> f64 {
        let v = self.value();
        if v.is_nan() {
            return f64::NEG_INFINITY;
        }
        match self {
            Self::Error(_) => -v,
            Self::Correlation(_) => v.abs(),
            Self::PositiveCorrelation(_) | Self::NotANumber => v,
        }
    }
}

impl fmt::Display for SmartScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotANumber => write!(f, "NaN"),
            s => write!(f, "{:.6}", s.value()),
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn range(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}

/// Pair `predicted` with `actual`, keeping the tail of an over-long prediction.
fn align<'a>(actual: &'a [f64], predicted: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let predicted = if predicted.len() > actual.len() {
        &predicted[predicted.len() - actual.len()..]
    } else {
        predicted
    };
    let n = predicted.len();
    (&actual[..n], predicted)
}

fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let (actual, predicted) = align(actual, predicted);
    if predicted.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (p - a).powi(2))
        .sum();
    (sum / predicted.len() as f64).sqrt()
}

/// Pearson correlation; NaN when either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let (mx, my) = (mean(xs), mean(ys));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

fn trimmed(actual: &[f64], predicted: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let (actual, predicted) = align(actual, predicted);
    let max = actual.iter().copied().fold(0.0, f64::max);
    let threshold = max * TRIM_FRACTION;
    actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a >= threshold && **a > 0.0)
        .map(|(a, p)| (*a, *p))
        .unzip()
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores query results against a reference series at fixed anchors.
///
/// Each anchor holds the reference lifted over the training window, zero at
/// the anchor. The aggregate score is the mean of the per-anchor scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scorer {
    method: ScoreMethod,
    anchors: BTreeMap<NaiveDateTime, ZeroIndexedSeries>,
}

impl Scorer {
    /// A scorer with no anchors; every score is the NaN sentinel.
    pub fn new(method: ScoreMethod) -> Self {
        Self {
            method,
            anchors: BTreeMap::new(),
        }
    }

    /// Anchor `reference` at each date over `[t_min, t_max)` of its own unit.
    pub fn with_reference(
        method: ScoreMethod,
        reference: &TimeSeries,
        t_min: i64,
        t_max: i64,
        anchors: &[NaiveDateTime],
    ) -> Self {
        let mut scorer = Self::new(method);
        for &anchor in anchors {
            let lifted = reference.lift(anchor, t_min, t_max);
            scorer.anchors.insert(anchor, lifted.into_series());
        }
        scorer
    }

    pub fn method(&self) -> ScoreMethod {
        self.method
    }

    pub fn anchors(&self) -> Vec<NaiveDateTime> {
        self.anchors.keys().copied().collect()
    }

    pub fn reference(&self, anchor: &NaiveDateTime) -> Option<&ZeroIndexedSeries> {
        self.anchors.get(anchor)
    }

    fn wrap(&self, value: f64) -> SmartScore {
        match self.method {
            ScoreMethod::Rmse
            | ScoreMethod::NrmseMean
            | ScoreMethod::NrmseMinMax
            | ScoreMethod::NrmseStd => SmartScore::Error(value),
            ScoreMethod::InputCorrelation | ScoreMethod::InputCorrelationTrimmed => {
                SmartScore::Correlation(value)
            }
            ScoreMethod::InputCorrelationPositiveOnly | ScoreMethod::CorrelationPositiveOnly => {
                SmartScore::PositiveCorrelation(value)
            }
        }
    }

    /// Raw per-window metric of `predicted` against `actual`.
    pub fn score_values(&self, actual: &[f64], predicted: &[f64]) -> f64 {
        match self.method {
            ScoreMethod::Rmse => rmse(actual, predicted),
            ScoreMethod::NrmseMean => {
                let (a, _) = align(actual, predicted);
                let m = mean(a);
                let e = rmse(actual, predicted);
                if m != 0.0 { e / m } else { e }
            }
            ScoreMethod::NrmseMinMax => {
                let (a, _) = align(actual, predicted);
                let r = range(a);
                let e = rmse(actual, predicted);
                if r != 0.0 && r.is_finite() { e / r } else { e }
            }
            ScoreMethod::NrmseStd => {
                let (a, _) = align(actual, predicted);
                let s = std_dev(a);
                let e = rmse(actual, predicted);
                if s != 0.0 { e / s } else { e }
            }
            ScoreMethod::InputCorrelation => {
                let (a, p) = align(actual, predicted);
                pearson(p, a)
            }
            ScoreMethod::InputCorrelationTrimmed => {
                let (a, p) = trimmed(actual, predicted);
                pearson(&p, &a)
            }
            ScoreMethod::InputCorrelationPositiveOnly | ScoreMethod::CorrelationPositiveOnly => {
                let (a, p) = align(actual, predicted);
                let r = pearson(p, a);
                if r < 0.0 { 0.0 } else { r }
            }
        }
    }

    /// Reference values a candidate is compared with at one anchor.
    fn actual<'a>(
        &self,
        reference: &'a ZeroIndexedSeries,
        prediction_method: &PredictionMethod,
    ) -> &'a [f64] {
        match self.method {
            ScoreMethod::InputCorrelation
            | ScoreMethod::InputCorrelationTrimmed
            | ScoreMethod::InputCorrelationPositiveOnly => reference.base_values(),
            ScoreMethod::CorrelationPositiveOnly
                if *prediction_method == PredictionMethod::TestBaseValues =>
            {
                reference.base_values()
            }
            _ => reference.predictions(),
        }
    }

    /// Score one candidate's results, keyed by anchor.
    ///
    /// An anchor without a result, or whose prediction fails, contributes NaN.
    pub fn score(
        &self,
        results: &BTreeMap<NaiveDateTime, ZeroIndexedSeries>,
        prediction_method: &PredictionMethod,
    ) -> SmartScore {
        if self.anchors.is_empty() {
            return SmartScore::NotANumber;
        }
        let predictor = predictor::for_method(prediction_method);
        let mut sum = 0.0;
        for (anchor, reference) in &self.anchors {
            let Some(driver) = results.get(anchor) else {
                warn!("no result for anchor {}", anchor);
                sum += f64::NAN;
                continue;
            };
            let value = match predict(predictor.as_ref(), driver, reference) {
                Ok(predicted) => {
                    self.score_values(self.actual(reference, prediction_method), &predicted)
                }
                Err(e) => {
                    warn!("prediction failed at {}: {}", anchor, e);
                    f64::NAN
                }
            };
            debug!("anchor {} scored {}", anchor, value);
            sum += value;
        }
        self.wrap(sum / self.anchors.len() as f64)
    }
}

/// Run `predictor` with a query result as driver and a reference as target.
pub fn predict(
    predictor: &dyn Predictor,
    driver: &ZeroIndexedSeries,
    target: &ZeroIndexedSeries,
) -> Result<Vec<f64>, predictor::PredictError> {
    predictor.predict(
        driver.base_values(),
        target.base_values(),
        driver.predictions(),
    )
}
