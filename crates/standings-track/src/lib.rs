//! File-backed experiment tracking.
//!
//! A [`TrackingStore`] holds experiments; each experiment holds runs. An
//! [`ActiveRun`] records params, metric histories and artifact files, and is
//! sealed as `FINISHED` or `FAILED` when it ends or is dropped.

mod error;
mod record;
mod run;
mod store;

pub use error::TrackError;
pub use record::{Experiment, MetricPoint, RunInfo, RunStatus};
pub use run::ActiveRun;
pub use store::TrackingStore;
