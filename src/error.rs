//! Error taxonomy
//!
//! Configuration errors are fatal at startup. Fetch and sink errors are
//! transient and never escape the scheduling loop. Control errors are what
//! the control surface hands back to its callers.

use std::path::PathBuf;

use crate::position_map::Position;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("strip has zero positions")]
    ZeroPositions,

    #[error("position {position} is mapped by both {first} and {second}")]
    DuplicatePosition {
        position: Position,
        first: String,
        second: String,
    },

    #[error("stop {0} is mapped more than once")]
    DuplicateStop(String),

    #[error("stop {stop} maps to position {position}, outside a strip of {count}")]
    PositionOutOfRange {
        stop: String,
        position: Position,
        count: usize,
    },

    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}

impl ConfigError {
    pub fn invalid_timing(msg: impl Into<String>) -> Self {
        Self::InvalidTiming(msg.into())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),
}

impl FetchError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether a transport-level retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Status(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Decode(_) | Self::MissingCredentials(_) => false,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("failed to write position {position}: {message}")]
    Write { position: Position, message: String },

    #[error("failed to flush strip: {0}")]
    Flush(String),

    #[error("display is not ready")]
    NotReady,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("LED {position} is already assigned to {stop}")]
    LedTaken { position: Position, stop: String },

    #[error("every station has been visited")]
    Finished,
}

#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error("LED controller not initialized")]
    SinkNotReady,

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to spawn update worker: {0}")]
    Spawn(String),
}
