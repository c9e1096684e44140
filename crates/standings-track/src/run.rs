//! The live handle of a run in progress.

use std::fmt::Display;
use std::fs;
use std::path::{Component, Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::TrackError;
use crate::record::{MetricPoint, RunInfo, RunStatus};
use crate::store::{ARTIFACTS_DIR, RUN_META, create_dir, write_json};

/// A run that is still `RUNNING`.
///
/// Every `log_*` call is persisted to `run.json` before it returns. The run
/// ends through [`ActiveRun::finish`] or [`ActiveRun::end`]; a run dropped
/// without either is recorded as `FAILED`.
#[derive(Debug)]
pub struct ActiveRun {
    run_dir: PathBuf,
    info: RunInfo,
    ended: bool,
}

impl ActiveRun {
    pub(crate) fn new(run_dir: PathBuf, info: RunInfo) -> Result<Self, TrackError> {
        let run = Self {
            run_dir,
            info,
            ended: false,
        };
        run.persist()?;
        Ok(run)
    }

    /// Generated run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    /// Id of the owning experiment.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.info.experiment_id
    }

    /// Snapshot of everything logged so far.
    #[must_use]
    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Directory that logged artifacts are copied into.
    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.run_dir.join(ARTIFACTS_DIR)
    }

    /// Record a param. Logging the same value twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`TrackError::ParamConflict`] if `key` was logged with a different
    /// value, or a write error.
    pub fn log_param(&mut self, key: &str, value: impl Display) -> Result<(), TrackError> {
        let value = value.to_string();
        if let Some(existing) = self.info.params.get(key) {
            if *existing == value {
                return Ok(());
            }
            return Err(TrackError::ParamConflict {
                key: key.to_string(),
                existing: existing.clone(),
                attempted: value,
            });
        }
        debug!(key, %value, "param logged");
        self.info.params.insert(key.to_string(), value);
        self.persist()
    }

    /// Append a metric value at the next step (0 for the first value).
    ///
    /// # Errors
    ///
    /// Same as [`ActiveRun::log_metric_at`].
    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<(), TrackError> {
        let step = self.info.metrics.get(key).map_or(0, |h| h.len() as u64);
        self.log_metric_at(key, value, step)
    }

    /// Append a metric value at an explicit step.
    ///
    /// # Errors
    ///
    /// [`TrackError::NonFiniteMetric`] for NaN or infinite values, or a write error.
    pub fn log_metric_at(&mut self, key: &str, value: f64, step: u64) -> Result<(), TrackError> {
        if !value.is_finite() {
            return Err(TrackError::NonFiniteMetric {
                key: key.to_string(),
                value,
            });
        }
        debug!(key, value, step, "metric logged");
        self.info
            .metrics
            .entry(key.to_string())
            .or_default()
            .push(MetricPoint {
                value,
                step,
                timestamp: OffsetDateTime::now_utc(),
            });
        self.persist()
    }

    /// Copy a local file into the run's artifacts, under `artifact_path` when given.
    ///
    /// Returns the artifact's path relative to the artifact directory, e.g.
    /// `random-forest-model/model.bin`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TrackError::InvalidArtifactPath`] | `artifact_path` is absolute or contains `..`, or `local_path` has no file name |
    /// | [`TrackError::CreateDir`] | the destination directory cannot be created |
    /// | [`TrackError::CopyArtifact`] | the copy fails |
    pub fn log_artifact(
        &mut self,
        local_path: &Path,
        artifact_path: Option<&str>,
    ) -> Result<String, TrackError> {
        let file_name = local_path
            .file_name()
            .ok_or_else(|| TrackError::InvalidArtifactPath {
                path: local_path.display().to_string(),
            })?;

        let relative_dir = match artifact_path {
            Some(sub) => {
                let sub_path = Path::new(sub);
                if !sub_path
                    .components()
                    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
                {
                    return Err(TrackError::InvalidArtifactPath {
                        path: sub.to_string(),
                    });
                }
                sub_path.to_path_buf()
            }
            None => PathBuf::new(),
        };
        let relative = relative_dir.join(file_name);

        let dest_dir = self.artifact_dir().join(&relative_dir);
        create_dir(&dest_dir)?;
        let dest = dest_dir.join(file_name);
        fs::copy(local_path, &dest).map_err(|e| TrackError::CopyArtifact {
            from: local_path.to_path_buf(),
            to: dest.clone(),
            source: e,
        })?;

        // Artifact names use forward slashes regardless of platform.
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!(artifact = %name, "artifact logged");
        if !self.info.artifacts.contains(&name) {
            self.info.artifacts.push(name.clone());
        }
        self.persist()?;
        Ok(name)
    }

    /// End the run as `FINISHED` and return its final record.
    ///
    /// # Errors
    ///
    /// A write error if the final record cannot be persisted.
    pub fn finish(self) -> Result<RunInfo, TrackError> {
        self.end(RunStatus::Finished)
    }

    /// End the run with `status` and return its final record.
    ///
    /// # Errors
    ///
    /// [`TrackError::NonTerminalStatus`] for `RUNNING` (the dropped run is
    /// then sealed as `FAILED`), or a write error if the final record cannot
    /// be persisted.
    pub fn end(mut self, status: RunStatus) -> Result<RunInfo, TrackError> {
        if !status.is_terminal() {
            return Err(TrackError::NonTerminalStatus {
                run_id: self.info.run_id.clone(),
                status,
            });
        }
        self.seal(status)?;
        Ok(self.info.clone())
    }

    fn seal(&mut self, status: RunStatus) -> Result<(), TrackError> {
        // Marked first so a failed write is not retried by Drop.
        self.ended = true;
        self.info.status = status;
        self.info.end_time = Some(OffsetDateTime::now_utc());
        self.persist()?;
        info!(run_id = %self.info.run_id, %status, "run ended");
        Ok(())
    }

    fn persist(&self) -> Result<(), TrackError> {
        write_json(&self.run_dir.join(RUN_META), &self.info)
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        warn!(run_id = %self.info.run_id, "run dropped without finishing, marking failed");
        if let Err(err) = self.seal(RunStatus::Failed) {
            warn!(error = %err, "could not mark run failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::error::TrackError;
    use crate::record::RunStatus;
    use crate::store::TrackingStore;

    fn store() -> (TempDir, TrackingStore) {
        let dir = TempDir::new().unwrap();
        let store = TrackingStore::open(dir.path().join("mlruns")).unwrap();
        (dir, store)
    }

    #[test]
    fn params_are_write_once() {
        let (_dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let mut run = store.start_run(&exp, "r").unwrap();
        run.log_param("num_trees", 10).unwrap();
        run.log_param("num_trees", "10").unwrap();
        let err = run.log_param("num_trees", 20).unwrap_err();
        assert!(matches!(err, TrackError::ParamConflict { ref existing, .. } if existing == "10"));
        let info = run.finish().unwrap();
        assert_eq!(info.params["num_trees"], "10");
    }

    #[test]
    fn metric_steps_increment() {
        let (_dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let mut run = store.start_run(&exp, "r").unwrap();
        run.log_metric("rmse", 3.0).unwrap();
        run.log_metric("rmse", 2.0).unwrap();
        assert!(matches!(
            run.log_metric("rmse", f64::NAN).unwrap_err(),
            TrackError::NonFiniteMetric { .. }
        ));
        let info = run.finish().unwrap();
        let steps: Vec<u64> = info.metrics["rmse"].iter().map(|p| p.step).collect();
        assert_eq!(steps, [0, 1]);
        assert_eq!(info.latest_metric("rmse"), Some(2.0));
    }

    #[test]
    fn artifacts_are_copied_under_subdirectory() {
        let (dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let mut run = store.start_run(&exp, "r").unwrap();

        let local = dir.path().join("model.bin");
        fs::write(&local, b"bytes").unwrap();
        let name = run.log_artifact(&local, Some("random-forest-model")).unwrap();
        assert_eq!(name, "random-forest-model/model.bin");
        let copied = run.artifact_dir().join("random-forest-model").join("model.bin");
        assert_eq!(fs::read(copied).unwrap(), b"bytes");

        let plain = run.log_artifact(&local, None).unwrap();
        assert_eq!(plain, "model.bin");

        let info = run.finish().unwrap();
        assert_eq!(info.artifacts, ["random-forest-model/model.bin", "model.bin"]);
    }

    #[test]
    fn escaping_artifact_path_rejected() {
        let (dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let mut run = store.start_run(&exp, "r").unwrap();
        let local = dir.path().join("a.csv");
        fs::write(&local, b"x").unwrap();
        assert!(matches!(
            run.log_artifact(&local, Some("../outside")).unwrap_err(),
            TrackError::InvalidArtifactPath { .. }
        ));
    }

    #[test]
    fn missing_artifact_source_fails() {
        let (dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let mut run = store.start_run(&exp, "r").unwrap();
        assert!(matches!(
            run.log_artifact(&dir.path().join("absent.csv"), None).unwrap_err(),
            TrackError::CopyArtifact { .. }
        ));
    }

    #[test]
    fn dropped_run_is_failed() {
        let (_dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let run_id = {
            let mut run = store.start_run(&exp, "r").unwrap();
            run.log_metric("rmse", 1.0).unwrap();
            run.run_id().to_string()
        };
        let info = store.get_run(&exp, &run_id).unwrap();
        assert_eq!(info.status, RunStatus::Failed);
        assert!(info.end_time.is_some());
    }

    #[test]
    fn ending_as_running_is_rejected() {
        let (_dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let run = store.start_run(&exp, "r").unwrap();
        let run_id = run.run_id().to_string();
        assert!(matches!(
            run.end(RunStatus::Running).unwrap_err(),
            TrackError::NonTerminalStatus { status: RunStatus::Running, .. }
        ));
        let info = store.get_run(&exp, &run_id).unwrap();
        assert_eq!(info.status, RunStatus::Failed);
    }

    #[test]
    fn running_status_is_persisted_immediately() {
        let (_dir, store) = store();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let run = store.start_run(&exp, "r").unwrap();
        let on_disk = store.get_run(&exp, run.run_id()).unwrap();
        assert_eq!(on_disk.status, RunStatus::Running);
        assert_eq!(on_disk.end_time, None);
        run.finish().unwrap();
    }
}
