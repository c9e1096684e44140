use std::path::PathBuf;

/// Errors from the experiment tracking store.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// Returned when a store, experiment, run, or artifact directory cannot be created.
    #[error("cannot create directory {path}")]
    CreateDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a metadata file or directory listing cannot be read.
    #[error("cannot read {path}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a metadata file cannot be written.
    #[error("cannot write {path}")]
    Write {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a metadata file is not valid JSON for its record type.
    #[error("malformed metadata in {path}")]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when a record cannot be encoded as JSON.
    #[error("cannot encode metadata for {path}")]
    Encode {
        /// The file that was about to be written.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Returned when an experiment name is empty or only whitespace.
    #[error("invalid experiment name \"{name}\"")]
    InvalidExperimentName {
        /// The rejected name.
        name: String,
    },

    /// Returned when no experiment has the requested name.
    #[error("experiment \"{name}\" not found")]
    ExperimentNotFound {
        /// The requested name.
        name: String,
    },

    /// Returned when no run has the requested id in the experiment.
    #[error("run {run_id} not found in experiment {experiment_id}")]
    RunNotFound {
        /// The experiment searched.
        experiment_id: String,
        /// The requested run id.
        run_id: String,
    },

    /// Returned when a param already logged in this run is logged with another value.
    #[error("param \"{key}\" already logged as \"{existing}\", refusing \"{attempted}\"")]
    ParamConflict {
        /// Param name.
        key: String,
        /// Value already recorded.
        existing: String,
        /// Value that was rejected.
        attempted: String,
    },

    /// Returned when a metric value is NaN or infinite.
    #[error("metric \"{key}\" has non-finite value {value}")]
    NonFiniteMetric {
        /// Metric name.
        key: String,
        /// The rejected value.
        value: f64,
    },

    /// Returned when a run is asked to end with a status that is not terminal.
    #[error("cannot end run {run_id} as {status}")]
    NonTerminalStatus {
        /// The run being ended.
        run_id: String,
        /// The rejected status.
        status: crate::record::RunStatus,
    },

    /// Returned when an artifact destination is absolute or escapes the run.
    #[error("invalid artifact path \"{path}\"")]
    InvalidArtifactPath {
        /// The rejected destination.
        path: String,
    },

    /// Returned when copying a local file into the run's artifacts fails.
    #[error("cannot copy artifact {from} to {to}")]
    CopyArtifact {
        /// Local file being logged.
        from: PathBuf,
        /// Destination inside the artifact directory.
        to: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
