use std::path::PathBuf;

/// Errors raised while loading dictionaries or ranking bills.
///
/// `Configuration`, `MalformedTermPattern` and `Settings` abort a run before any
/// bill is touched. `BillTextUnavailable` and `Persistence` are per-bill and are
/// absorbed by the bulk ranker.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("configuration error in {path}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    #[error("term {key:?} in {path} has a malformed pattern: {source}")]
    MalformedTermPattern {
        path: PathBuf,
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("bill text unavailable at {path}: {source}")]
    BillTextUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("invalid measure id: {0:?}")]
    InvalidMeasure(String),

    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl From<sled::Error> for RankError {
    fn from(err: sled::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<bincode::Error> for RankError {
    fn from(err: bincode::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RankError>;
