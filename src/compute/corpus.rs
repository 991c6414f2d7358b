//! Event corpora and reference series loading.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{info, warn};
use serde::Deserialize;

use super::query::{EvalSettings, Query};
use super::series::{ResolutionUnit, TimeSeries};
use crate::schema::Event;

/// Corpus loading or evaluation failures.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} contained no usable records")]
    Empty(PathBuf),
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

/// Anything that can evaluate a query over its events.
///
/// The search only needs a time series of counts per (query, anchor); how
/// the events are stored or reached is up to the implementation.
pub trait CorpusProvider: Send + Sync {
    fn evaluate(
        &self,
        query: &mut Query,
        settings: &EvalSettings<'_>,
    ) -> Result<TimeSeries, CorpusError>;
}

/// Read-only events, ordered by event time.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    events: Vec<Event>,
}

impl Corpus {
    pub fn from_events(mut events: Vec<Event>) -> Self {
        events.sort_by_key(|e| (e.event_time, e.id));
        Self { events }
    }

    /// Read one JSON event per line. Malformed lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R, source: &Path) -> Result<Self, CorpusError> {
        let mut events = Vec::new();
        let mut skipped = 0usize;
        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|source_err| CorpusError::Io {
                path: source.to_path_buf(),
                source: source_err,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped += 1;
                    warn!("{}:{}: skipping malformed event: {}", source.display(), n + 1, e);
                }
            }
        }
        info!(
            "loaded {} events from {} ({} skipped)",
            events.len(),
            source.display(),
            skipped
        );
        Ok(Self::from_events(events))
    }

    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file), path)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Earliest and latest event times.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.events.first()?.event_time, self.events.last()?.event_time))
    }
}

/// In-process provider over a shared corpus.
#[derive(Debug, Clone)]
pub struct LocalCorpus {
    corpus: Arc<Corpus>,
}

impl LocalCorpus {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }
}

impl CorpusProvider for LocalCorpus {
    fn evaluate(
        &self,
        query: &mut Query,
        settings: &EvalSettings<'_>,
    ) -> Result<TimeSeries, CorpusError> {
        Ok(query.evaluate(self.corpus.events(), settings))
    }
}

#[derive(Deserialize)]
struct ReferencePoint {
    time: NaiveDateTime,
    value: f64,
}

/// Load a reference series: one `{"time": .., "value": ..}` object per line.
///
/// The series is anchored at the earliest point. Malformed lines are skipped.
pub fn load_reference_series(
    path: impl AsRef<Path>,
    resolution: i64,
    unit: ResolutionUnit,
) -> Result<TimeSeries, CorpusError> {
    let path = path.as_ref();
    let io_err = |source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut points = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReferencePoint>(&line) {
            Ok(p) => points.push(p),
            Err(e) => warn!("{}:{}: skipping malformed point: {}", path.display(), n + 1, e),
        }
    }

    let t_zero = points
        .iter()
        .map(|p| p.time)
        .min()
        .ok_or_else(|| CorpusError::Empty(path.to_path_buf()))?;
    let mut series = TimeSeries::new(t_zero, resolution, unit);
    for p in &points {
        series.add_counts_at(p.time, p.value);
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::QueryTemplate;
    use chrono::NaiveDate;
    use std::io::Write;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 7, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_load_jsonl_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let good = serde_json::to_string(&Event::at(1, day(3))).unwrap();
        let other = serde_json::to_string(&Event::at(2, day(1))).unwrap();
        writeln!(file, "{}", good).unwrap();
        writeln!(file, "{{\"id\": \"oops\"}}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", other).unwrap();

        let corpus = Corpus::load_jsonl(file.path()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.events()[0].id, 2);
        assert_eq!(corpus.span(), Some((day(1), day(3))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Corpus::load_jsonl("/nonexistent/events.jsonl").unwrap_err();
        assert!(matches!(err, CorpusError::Io { .. }));
    }

    #[test]
    fn test_local_corpus_evaluates_query() {
        let corpus = Arc::new(Corpus::from_events(vec![
            Event::at(1, day(9)),
            Event::at(2, day(10)),
        ]));
        let provider = LocalCorpus::new(corpus);
        let template = QueryTemplate::default();
        let mut query = Query::match_all(-2, 2, &template);
        query.shift = 0;
        let settings = EvalSettings {
            template: &template,
            t_zero: day(10),
            resolution: 1,
            unit: ResolutionUnit::Days,
            use_date_added: false,
        };
        let series = provider.evaluate(&mut query, &settings).unwrap();
        assert_eq!(series.series().total(), 2.0);
    }

    #[test]
    fn test_reference_series_anchors_at_first_point() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"time\": \"2020-07-05T00:00:00\", \"value\": 4.0}}").unwrap();
        writeln!(file, "{{\"time\": \"2020-07-03T00:00:00\", \"value\": 2.0}}").unwrap();
        writeln!(file, "not json").unwrap();

        let series = load_reference_series(file.path(), 1, ResolutionUnit::Days).unwrap();
        assert_eq!(series.t_zero(), day(3));
        assert_eq!(series.count_at_time(day(5)), 4.0);
        assert_eq!(series.values(), &[2.0, 0.0, 4.0]);
    }
}
