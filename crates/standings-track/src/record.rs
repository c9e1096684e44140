//! Persisted experiment and run records.

use std::collections::BTreeMap;
use std::fmt;

use time::OffsetDateTime;

/// A named group of runs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Experiment {
    /// Store-assigned id; decimal integers in creation order.
    pub experiment_id: String,
    /// Unique human-readable name.
    pub name: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Started and still accepting params, metrics, and artifacts.
    Running,
    /// Ended normally.
    Finished,
    /// Ended by an error or by being dropped without finishing.
    Failed,
}

impl RunStatus {
    /// Return `true` once the run can no longer change.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        })
    }
}

/// One recorded value of a metric.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetricPoint {
    /// The value.
    pub value: f64,
    /// Caller-supplied step; defaults to the number of earlier points.
    pub step: u64,
    /// When the value was logged.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunInfo {
    /// 32-character lowercase hex id.
    pub run_id: String,
    /// Free-form display name.
    pub run_name: String,
    /// Owning experiment.
    pub experiment_id: String,
    /// Lifecycle state.
    pub status: RunStatus,
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    /// When the run ended, if it has.
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    /// Params as strings, sorted by key.
    pub params: BTreeMap<String, String>,
    /// Metric histories in logging order, sorted by key.
    pub metrics: BTreeMap<String, Vec<MetricPoint>>,
    /// Artifact paths relative to the run's artifact directory.
    pub artifacts: Vec<String>,
}

impl RunInfo {
    /// Most recently logged value of a metric.
    #[must_use]
    pub fn latest_metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key)?.last().map(|p| p.value)
    }

    /// Latest value of every metric.
    #[must_use]
    pub fn latest_metrics(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .filter_map(|(k, points)| points.last().map(|p| (k.clone(), p.value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use time::macros::datetime;

    use super::{MetricPoint, RunInfo, RunStatus};

    fn info() -> RunInfo {
        let t = datetime!(2024-03-02 15:00 UTC);
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "rmse".to_string(),
            vec![
                MetricPoint { value: 3.0, step: 0, timestamp: t },
                MetricPoint { value: 2.5, step: 1, timestamp: t },
            ],
        );
        RunInfo {
            run_id: "0123456789abcdef0123456789abcdef".into(),
            run_name: "baseline".into(),
            experiment_id: "0".into(),
            status: RunStatus::Finished,
            start_time: t,
            end_time: Some(t),
            params: BTreeMap::from([("num_trees".to_string(), "10".to_string())]),
            metrics,
            artifacts: vec!["importance.csv".into()],
        }
    }

    #[test]
    fn latest_metric_is_last_point() {
        let info = info();
        assert_eq!(info.latest_metric("rmse"), Some(2.5));
        assert_eq!(info.latest_metric("mae"), None);
        assert_eq!(info.latest_metrics().get("rmse"), Some(&2.5));
    }

    #[test]
    fn json_round_trip_uses_upper_case_status() {
        let info = info();
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"FINISHED\""));
        assert!(json.contains("2024-03-02T15:00:00Z"));
        let back: RunInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn terminal_states() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert_eq!(RunStatus::Finished.to_string(), "FINISHED");
    }
}
