use thiserror::Error;

/// Failure of a single navigation or element wait.
///
/// None of these are retried in place: the caller abandons the current unit of
/// work (one query's pagination, or one product page) and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("fetch failed: {0}")]
    Other(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::Network(_) => "network",
            FetchError::Other(_) => "other",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Why a stage stopped before producing its output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("bot challenge at {url} ({marker})")]
    Challenge { url: String, marker: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl StageError {
    pub fn is_challenge(&self) -> bool {
        matches!(self, StageError::Challenge { .. })
    }
}

/// The record sink refused a record. Ends the run.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write record: {0}")]
    Io(#[from] std::io::Error),
}

/// Missing or malformed settings. Fatal to the run, reported once at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found (looked in: {0})")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("site '{0}' is not defined under `sites`")]
    UnknownSite(String),

    #[error("no keywords to search")]
    NoKeywords,

    #[error("site '{site}': {message}")]
    Invalid { site: String, message: String },
}
