//! Prediction back ends.
//!
//! A predictor receives the query's counts before the anchor (driver
//! history), the reference values before the anchor (target history) and the
//! query's counts from the anchor on (forecast driver), and returns predicted
//! target values for the forecast window.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::schema::PredictionMethod;

/// Poll interval while waiting on a script predictor.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Prediction back-end failures. The scorer maps every one of these to NaN.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Regression is degenerate: {0}")]
    Degenerate(String),
    #[error("Failed to launch predictor: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Predictor exited with status {0}")]
    Status(String),
    #[error("Predictor produced no output")]
    NoOutput,
    #[error("Unparseable predictor output: {0}")]
    Parse(String),
    #[error("Predictor timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns history and forecast drivers into predicted target values.
pub trait Predictor: Send + Sync {
    fn predict(
        &self,
        history_driver: &[f64],
        history_target: &[f64],
        forecast_driver: &[f64],
    ) -> Result<Vec<f64>, PredictError>;
}

/// Forecast driver values, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPredictor;

impl Predictor for RawPredictor {
    fn predict(&self, _: &[f64], _: &[f64], forecast: &[f64]) -> Result<Vec<f64>, PredictError> {
        Ok(forecast.to_vec())
    }
}

/// History driver values, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseValuesPredictor;

impl Predictor for BaseValuesPredictor {
    fn predict(&self, history: &[f64], _: &[f64], _: &[f64]) -> Result<Vec<f64>, PredictError> {
        Ok(history.to_vec())
    }
}

/// Ordinary least squares of target on driver, clamped at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRegressionPredictor;

impl LinearRegressionPredictor {
    /// `(slope, intercept)` of the fit over paired history points.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<(f64, f64), PredictError> {
        let n = xs.len().min(ys.len());
        if n < 2 {
            return Err(PredictError::Degenerate(format!("{} paired points", n)));
        }
        let (xs, ys) = (&xs[..n], &ys[..n]);
        let mx = xs.iter().sum::<f64>() / n as f64;
        let my = ys.iter().sum::<f64>() / n as f64;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            sxx += (x - mx) * (x - mx);
            sxy += (x - mx) * (y - my);
        }
        if sxx == 0.0 {
            return Err(PredictError::Degenerate("driver history is constant".into()));
        }
        let slope = sxy / sxx;
        Ok((slope, my - slope * mx))
    }
}

impl Predictor for LinearRegressionPredictor {
    fn predict(
        &self,
        history_driver: &[f64],
        history_target: &[f64],
        forecast_driver: &[f64],
    ) -> Result<Vec<f64>, PredictError> {
        let (slope, intercept) = Self::fit(history_driver, history_target)?;
        Ok(forecast_driver
            .iter()
            .map(|x| (x * slope + intercept).max(0.0))
            .collect())
    }
}

/// Out-of-process predictor.
///
/// Invoked as `interpreter script trainX trainY testX`, each argument a
/// comma-separated list. The last non-empty stdout line is the prediction.
#[derive(Debug, Clone)]
pub struct ScriptPredictor {
    pub interpreter: String,
    pub script: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the last non-empty line of `output` as comma-separated numbers.
pub fn parse_prediction(output: &str) -> Result<Vec<f64>, PredictError> {
    let line = output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or(PredictError::NoOutput)?;
    line.split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| PredictError::Parse(line.to_string()))
        })
        .collect()
}

impl Predictor for ScriptPredictor {
    fn predict(
        &self,
        history_driver: &[f64],
        history_target: &[f64],
        forecast_driver: &[f64],
    ) -> Result<Vec<f64>, PredictError> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.script)
            .arg(join(history_driver))
            .arg(join(history_target))
            .arg(join(forecast_driver))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!("running predictor {}", self.script.display());
        let mut child = command.spawn()?;
        let mut stdout = child.stdout.take().ok_or(PredictError::NoOutput)?;
        let reader = std::thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(limit) = self.timeout
                && started.elapsed() > limit
            {
                if let Err(e) = child.kill() {
                    warn!("failed to kill predictor: {}", e);
                }
                if let Err(e) = child.wait() {
                    warn!("failed to reap predictor after kill: {}", e);
                }
                return Err(PredictError::Timeout(limit));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let output = reader
            .join()
            .map_err(|_| PredictError::NoOutput)??;
        if !status.success() {
            return Err(PredictError::Status(status.to_string()));
        }
        parse_prediction(&output)
    }
}

/// Predictor for a configured method.
pub fn for_method(method: &PredictionMethod) -> Box<dyn Predictor> {
    match method {
        PredictionMethod::Raw => Box::new(RawPredictor),
        PredictionMethod::LinearRegression => Box::new(LinearRegressionPredictor),
        PredictionMethod::TestBaseValues => Box::new(BaseValuesPredictor),
        PredictionMethod::Script {
            interpreter,
            script,
            working_dir,
            timeout_secs,
        } => Box::new(ScriptPredictor {
            interpreter: interpreter.clone(),
            script: script.clone(),
            working_dir: working_dir.clone(),
            timeout: timeout_secs.map(Duration::from_secs),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_and_base_values() {
        let history = [1.0, 2.0];
        let forecast = [3.0, 4.0, 5.0];
        assert_eq!(
            RawPredictor.predict(&history, &[], &forecast).unwrap(),
            forecast.to_vec()
        );
        assert_eq!(
            BaseValuesPredictor.predict(&history, &[], &forecast).unwrap(),
            history.to_vec()
        );
    }

    #[test]
    fn test_linear_regression_fits_and_clamps() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [3.0, 5.0, 7.0, 9.0];
        let (slope, intercept) = LinearRegressionPredictor::fit(&xs, &ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);

        let out = LinearRegressionPredictor
            .predict(&xs, &ys, &[5.0, -10.0])
            .unwrap();
        assert!((out[0] - 11.0).abs() < 1e-12);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_linear_regression_rejects_constant_driver() {
        let result = LinearRegressionPredictor.predict(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0], &[2.0]);
        assert!(matches!(result, Err(PredictError::Degenerate(_))));
    }

    #[test]
    fn test_parse_prediction_uses_last_line() {
        let out = "loading model\n1.5,2,3\n\n";
        assert_eq!(parse_prediction(out).unwrap(), vec![1.5, 2.0, 3.0]);
        assert!(matches!(parse_prediction(""), Err(PredictError::NoOutput)));
        assert!(matches!(
            parse_prediction("1,two"),
            Err(PredictError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_interpreter_is_an_error() {
        let predictor = ScriptPredictor {
            interpreter: "definitely-not-an-interpreter-7f3a".into(),
            script: "predict.py".into(),
            working_dir: None,
            timeout: Some(Duration::from_secs(1)),
        };
        assert!(matches!(
            predictor.predict(&[1.0], &[1.0], &[1.0]),
            Err(PredictError::Spawn(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_script_times_out_and_is_reaped() {
        use std::io::Write;

        let mut script = tempfile::NamedTempFile::new().unwrap();
        writeln!(script, "sleep 5").unwrap();
        let predictor = ScriptPredictor {
            interpreter: "sh".into(),
            script: script.path().to_path_buf(),
            working_dir: None,
            timeout: Some(Duration::from_millis(100)),
        };
        let started = Instant::now();
        assert!(matches!(
            predictor.predict(&[1.0], &[1.0], &[1.0]),
            Err(PredictError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_for_method_dispatch() {
        let p = for_method(&PredictionMethod::TestBaseValues);
        assert_eq!(p.predict(&[7.0], &[], &[1.0]).unwrap(), vec![7.0]);
    }
}
