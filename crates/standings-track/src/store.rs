//! Directory-backed store of experiments and runs.
//!
//! ```text
//! {root}/{experiment_id}/meta.json
//! {root}/{experiment_id}/{run_id}/run.json
//! {root}/{experiment_id}/{run_id}/artifacts/...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::error::TrackError;
use crate::record::{Experiment, RunInfo, RunStatus};
use crate::run::ActiveRun;

pub(crate) const EXPERIMENT_META: &str = "meta.json";
pub(crate) const RUN_META: &str = "run.json";
pub(crate) const ARTIFACTS_DIR: &str = "artifacts";

/// Handle to a tracking directory.
#[derive(Debug, Clone)]
pub struct TrackingStore {
    root: PathBuf,
}

impl TrackingStore {
    /// Open the store at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TrackError::CreateDir`] if the directory cannot be created.
    #[instrument(fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>) -> Result<Self, TrackError> {
        let root = root.as_ref().to_path_buf();
        create_dir(&root)?;
        debug!("tracking store ready");
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All experiments, ordered by numeric id.
    ///
    /// Directories without a `meta.json` are ignored.
    ///
    /// # Errors
    ///
    /// [`TrackError::Read`] or [`TrackError::Parse`] for unreadable metadata.
    pub fn list_experiments(&self) -> Result<Vec<Experiment>, TrackError> {
        let mut experiments: Vec<Experiment> = subdirs(&self.root)?
            .into_iter()
            .map(|dir| dir.join(EXPERIMENT_META))
            .filter(|meta| meta.is_file())
            .map(|meta| read_json(&meta))
            .collect::<Result<_, _>>()?;
        experiments.sort_by_key(|e| e.experiment_id.parse::<u64>().unwrap_or(u64::MAX));
        Ok(experiments)
    }

    /// Look up an experiment by exact name.
    ///
    /// # Errors
    ///
    /// [`TrackError::ExperimentNotFound`] if no experiment has that name,
    /// otherwise the same as [`TrackingStore::list_experiments`].
    pub fn experiment_by_name(&self, name: &str) -> Result<Experiment, TrackError> {
        self.list_experiments()?
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| TrackError::ExperimentNotFound {
                name: name.to_string(),
            })
    }

    /// Return the experiment called `name`, creating it with the next free id
    /// if it does not exist yet.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TrackError::InvalidExperimentName`] | `name` is blank |
    /// | [`TrackError::CreateDir`] / [`TrackError::Write`] | the experiment cannot be persisted |
    /// | [`TrackError::Read`] / [`TrackError::Parse`] | existing metadata is unreadable |
    #[instrument(skip(self))]
    pub fn experiment_by_name_or_create(&self, name: &str) -> Result<Experiment, TrackError> {
        if name.trim().is_empty() {
            return Err(TrackError::InvalidExperimentName {
                name: name.to_string(),
            });
        }
        let existing = self.list_experiments()?;
        if let Some(found) = existing.iter().find(|e| e.name == name) {
            debug!(experiment_id = %found.experiment_id, "experiment found");
            return Ok(found.clone());
        }

        let next_id = existing
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);
        let experiment = Experiment {
            experiment_id: next_id.to_string(),
            name: name.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        let dir = self.experiment_dir(&experiment.experiment_id);
        create_dir(&dir)?;
        write_json(&dir.join(EXPERIMENT_META), &experiment)?;
        info!(experiment_id = %experiment.experiment_id, "experiment created");
        Ok(experiment)
    }

    /// Begin a new run in `experiment`.
    ///
    /// The run is persisted immediately with status `RUNNING`. Finish it with
    /// [`ActiveRun::finish`]; dropping it unfinished marks it `FAILED`.
    ///
    /// # Errors
    ///
    /// [`TrackError::CreateDir`] or [`TrackError::Write`] if the run cannot be persisted.
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.experiment_id))]
    pub fn start_run(&self, experiment: &Experiment, run_name: &str) -> Result<ActiveRun, TrackError> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = self.experiment_dir(&experiment.experiment_id).join(&run_id);
        create_dir(&run_dir.join(ARTIFACTS_DIR))?;

        let info = RunInfo {
            run_id,
            run_name: run_name.to_string(),
            experiment_id: experiment.experiment_id.clone(),
            status: RunStatus::Running,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            params: Default::default(),
            metrics: Default::default(),
            artifacts: Vec::new(),
        };
        let run = ActiveRun::new(run_dir, info)?;
        info!(run_id = %run.run_id(), "run started");
        Ok(run)
    }

    /// Run `body` inside a new run of the experiment called `experiment_name`.
    ///
    /// The run is always ended: `FINISHED` when `body` returns `Ok`, `FAILED`
    /// when it returns `Err`. The final record is returned with the body's
    /// value.
    ///
    /// # Errors
    ///
    /// Whatever `body` returns, or any [`TrackError`] from creating or
    /// ending the run, converted into `E`.
    pub fn with_run<T, E, F>(
        &self,
        experiment_name: &str,
        run_name: &str,
        body: F,
    ) -> Result<(T, RunInfo), E>
    where
        F: FnOnce(&mut ActiveRun) -> Result<T, E>,
        E: From<TrackError>,
    {
        let experiment = self.experiment_by_name_or_create(experiment_name)?;
        let mut run = self.start_run(&experiment, run_name)?;
        match body(&mut run) {
            Ok(value) => {
                let info = run.finish()?;
                Ok((value, info))
            }
            Err(err) => {
                if let Err(end_err) = run.end(RunStatus::Failed) {
                    warn!(error = %end_err, "could not mark run failed");
                }
                Err(err)
            }
        }
    }

    /// All runs of `experiment`, oldest first.
    ///
    /// # Errors
    ///
    /// [`TrackError::Read`] or [`TrackError::Parse`] for unreadable run metadata.
    pub fn list_runs(&self, experiment: &Experiment) -> Result<Vec<RunInfo>, TrackError> {
        let dir = self.experiment_dir(&experiment.experiment_id);
        let mut runs: Vec<RunInfo> = subdirs(&dir)?
            .into_iter()
            .map(|run_dir| run_dir.join(RUN_META))
            .filter(|meta| meta.is_file())
            .map(|meta| read_json(&meta))
            .collect::<Result<_, _>>()?;
        runs.sort_by_key(|r| r.start_time);
        Ok(runs)
    }

    /// Load one run by id.
    ///
    /// # Errors
    ///
    /// [`TrackError::RunNotFound`] if the run does not exist, otherwise read errors.
    pub fn get_run(&self, experiment: &Experiment, run_id: &str) -> Result<RunInfo, TrackError> {
        let meta = self
            .experiment_dir(&experiment.experiment_id)
            .join(run_id)
            .join(RUN_META);
        if !meta.is_file() {
            return Err(TrackError::RunNotFound {
                experiment_id: experiment.experiment_id.clone(),
                run_id: run_id.to_string(),
            });
        }
        read_json(&meta)
    }

    /// The finished run with the best latest value of `metric`.
    ///
    /// Runs that never logged the metric, or did not finish, are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`TrackingStore::list_runs`].
    pub fn best_run(
        &self,
        experiment: &Experiment,
        metric: &str,
        maximize: bool,
    ) -> Result<Option<RunInfo>, TrackError> {
        let best = self
            .list_runs(experiment)?
            .into_iter()
            .filter(|r| r.status == RunStatus::Finished)
            .filter_map(|r| r.latest_metric(metric).map(|v| (v, r)))
            .max_by(|(a, _), (b, _)| if maximize { a.total_cmp(b) } else { b.total_cmp(a) })
            .map(|(_, run)| run);
        Ok(best)
    }

    /// Directory holding the artifacts of a run.
    #[must_use]
    pub fn artifact_dir(&self, run: &RunInfo) -> PathBuf {
        self.experiment_dir(&run.experiment_id)
            .join(&run.run_id)
            .join(ARTIFACTS_DIR)
    }

    fn experiment_dir(&self, experiment_id: &str) -> PathBuf {
        self.root.join(experiment_id)
    }
}

pub(crate) fn create_dir(path: &Path) -> Result<(), TrackError> {
    fs::create_dir_all(path).map_err(|e| TrackError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, TrackError> {
    let read_err = |e| TrackError::Read {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, TrackError> {
    let bytes = fs::read(path).map_err(|e| TrackError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| TrackError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write pretty JSON via a sibling temp file and rename, so readers never
/// observe a half-written record.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), TrackError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| TrackError::Encode {
        path: path.to_path_buf(),
        source: e,
    })?;
    let tmp = path.with_extension("json.tmp");
    let write_err = |e| TrackError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    fs::write(&tmp, &json).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::TrackingStore;
    use crate::error::TrackError;
    use crate::record::RunStatus;

    #[test]
    fn experiment_ids_are_sequential() {
        let dir = TempDir::new().unwrap();
        let store = TrackingStore::open(dir.path()).unwrap();
        let a = store.experiment_by_name_or_create("driver-standings").unwrap();
        let b = store.experiment_by_name_or_create("constructors").unwrap();
        let again = store.experiment_by_name_or_create("driver-standings").unwrap();
        assert_eq!(a.experiment_id, "0");
        assert_eq!(b.experiment_id, "1");
        assert_eq!(again, a);
        assert_eq!(store.list_experiments().unwrap().len(), 2);
    }

    #[test]
    fn blank_experiment_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = TrackingStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.experiment_by_name_or_create("  ").unwrap_err(),
            TrackError::InvalidExperimentName { .. }
        ));
    }

    #[test]
    fn run_ids_are_32_hex() {
        let dir = TempDir::new().unwrap();
        let store = TrackingStore::open(dir.path()).unwrap();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        let info = store.start_run(&exp, "r").unwrap().finish().unwrap();
        assert_eq!(info.run_id.len(), 32);
        assert!(info.run_id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(info.status, RunStatus::Finished);
        assert!(store.artifact_dir(&info).is_dir());
    }

    #[test]
    fn get_run_missing() {
        let dir = TempDir::new().unwrap();
        let store = TrackingStore::open(dir.path()).unwrap();
        let exp = store.experiment_by_name_or_create("e").unwrap();
        assert!(matches!(
            store.get_run(&exp, "nope").unwrap_err(),
            TrackError::RunNotFound { .. }
        ));
    }

    #[test]
    fn corrupt_meta_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = TrackingStore::open(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("7")).unwrap();
        std::fs::write(dir.path().join("7").join("meta.json"), b"{").unwrap();
        assert!(matches!(
            store.list_experiments().unwrap_err(),
            TrackError::Parse { .. }
        ));
    }
}
