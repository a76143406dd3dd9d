use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create store directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to encode store snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write store snapshot {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("invalid non-numeric value for metric `{name}`")]
    NonNumeric { name: String },
    #[error("invalid type for attribute `{name}`")]
    InvalidAttribute { name: String },
    #[error("unknown source type for key `{name}`")]
    UnknownSourceType { name: String },
    #[error("samples for `{name}` are too close in time, skipping sampling")]
    TooClose { name: String },
    #[error("samples for `{name}` go back in time, skipping sampling")]
    ClockWentBack { name: String },
    #[error("source for `{name}` was reset, skipping sampling")]
    Reset { name: String },
    #[error("metric name `{name}` is reserved")]
    ReservedName { name: String },
    #[error("`{name}` is already reported as a different kind of metric")]
    DuplicateName { name: String },
}
impl SampleError {
    /// Expected conditions after which the store already holds the new baseline.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::TooClose { .. } | Self::ClockWentBack { .. } | Self::Reset { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid store ttl {value:?}: {source}")]
    InvalidTtl {
        value: String,
        source: humantime::DurationError,
    },
}
