//! Reporting types produced by a search run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::compute::{Query, SmartScore};

// ============================================================================
// Criteria summary
// ============================================================================

/// Weighted tally of the literal values a query tree matches, per attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CriteriaSummary {
    pub attributes: BTreeMap<String, BTreeMap<String, f64>>,
}

impl CriteriaSummary {
    pub fn tally(&mut self, attribute: &str, value: String, weight: f64) {
        *self
            .attributes
            .entry(attribute.to_string())
            .or_default()
            .entry(value)
            .or_insert(0.0) += weight;
    }

    /// Accumulated weight of `value` under `attribute`, zero if absent.
    pub fn weight(&self, attribute: &str, value: &str) -> f64 {
        self.attributes
            .get(attribute)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0.0)
    }

    /// Values of `attribute`, heaviest first.
    pub fn sorted(&self, attribute: &str) -> Vec<(&str, f64)> {
        let mut values: Vec<(&str, f64)> = self
            .attributes
            .get(attribute)
            .map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)).collect())
            .unwrap_or_default();
        values.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        values
    }
}

impl fmt::Display for CriteriaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attribute in self.attributes.keys() {
            write!(f, "SUMMARY: {}: Total Scores: ", attribute)?;
            for (i, (value, weight)) in self.sorted(attribute).into_iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{} ({})", value, weight)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ============================================================================
// Run history
// ============================================================================

/// One evaluated candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u64,
    pub score: SmartScore,
    pub best_score: SmartScore,
    pub improved: bool,
}

/// A new best query re-evaluated against one held-out reference window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub criterion: String,
    /// Iteration that produced the best query.
    pub iteration: u64,
    pub anchor: NaiveDateTime,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
    /// Per-window metric of `predicted` against `actual`; absent if prediction failed.
    pub score: Option<f64>,
}

/// Why the driving loop stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// The iterator produced no further candidates.
    Exhausted,
    /// Too many candidates since the last improvement.
    Stale,
    /// Too much wall-clock time since the last improvement.
    Timeout,
}

/// Final result of one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationOutcome {
    pub label: String,
    /// Best query with evaluation state cleared, or the seed if nothing scored.
    pub best_query: Option<Query>,
    pub best_score: SmartScore,
    pub best_summary: String,
    pub stop_reason: StopReason,
    pub iterations: u64,
    pub improvements: u64,
    pub elapsed_seconds: f64,
    pub history: Vec<IterationRecord>,
    pub tests: Vec<TestResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_display_sorts_by_weight() {
        let mut summary = CriteriaSummary::default();
        summary.tally("RootCode", "3".into(), 1.0);
        summary.tally("RootCode", "7".into(), 2.0);
        summary.tally("RootCode", "3".into(), 2.0);
        summary.tally("GoldsteinScale", "[-2,4)".into(), 1.0);

        assert_eq!(summary.weight("RootCode", "3"), 3.0);
        assert_eq!(summary.weight("QuadClass", "1"), 0.0);
        assert_eq!(
            summary.to_string(),
            "SUMMARY: GoldsteinScale: Total Scores: [-2,4) (1)\n\
             SUMMARY: RootCode: Total Scores: 3 (3),7 (2)\n"
        );
    }

    #[test]
    fn test_stop_reason_serializes_as_name() {
        assert_eq!(
            serde_json::to_string(&StopReason::Stale).unwrap(),
            "\"Stale\""
        );
    }
}
