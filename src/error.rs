//! Error types for the liftmodel engine.

use thiserror::Error;

/// Errors that can occur when parsing user-supplied values.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown muscle group: {0}")]
    UnknownMuscle(String),

    #[error("invalid weight value: {0}")]
    InvalidWeight(String),

    #[error("invalid gender: {0}")]
    InvalidGender(String),

    #[error("invalid leaderboard filter {field}: {value}")]
    InvalidFilter { field: &'static str, value: String },
}

/// Errors raised by the local record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access record file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while talking to the shared ranking store.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ranking store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ranking store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("ranking store unavailable: {0}")]
    Unavailable(String),
}

/// Errors in engine settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings format: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: String,
        min: f64,
        max: f64,
        value: f64,
    },
}

/// Errors returned by engine-facing operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("repetitions must be at least 1")]
    InvalidReps,

    #[error("{exercise} takes {min} to {max} repetitions, got {reps}")]
    RepsOutOfRange {
        exercise: String,
        reps: u32,
        min: u32,
        max: u32,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}
