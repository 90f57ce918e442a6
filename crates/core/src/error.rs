//! Error taxonomy for the finding pipeline.
//!
//! Each stage owns a small error enum; `PipelineError` is the top-level type
//! returned by the run driver. Per-chunk analysis failures are recovered via
//! retry and surface as coverage gaps, so `AnalysisError` only reaches callers
//! wrapped in a [`crate::orchestrator::ChunkResult::Incomplete`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal configuration problems. Raised before any analysis begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required config key: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

/// A single analysis request failed. Recovered per chunk via retry.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("unparseable provider response: {0}")]
    MalformedResponse(String),

    #[error("analysis cancelled")]
    Cancelled,
}

/// A suppression command was rejected. No ledger state changes on any of
/// these; `VersionConflict` is the only retryable variant.
#[derive(Error, Debug)]
pub enum FalsePositiveCommandError {
    #[error("command does not match the configured pattern: {0}")]
    BadSyntax(String),

    #[error("no finding matches `{check}` at {file}:{line}")]
    UnknownFinding {
        check: String,
        file: String,
        line: usize,
    },

    #[error("a non-empty reason is required to mark a false positive")]
    MissingReason,

    #[error("`{user}` does not have permission to approve or reject marks")]
    PermissionDenied { user: String },

    #[error("mark for {key} was modified concurrently (expected version {expected}); retry")]
    VersionConflict { key: String, expected: u64 },

    #[error("mark for {key} is in state {state} and cannot take this transition")]
    InvalidTransition { key: String, state: String },

    #[error("false-positive handling is disabled in configuration")]
    Disabled,

    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Publishing the computed report failed.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("report surface error: {0}")]
    Surface(String),

    #[error("publish failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Top-level pipeline failure.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("rate limit exceeded: run deadline of {0:?} passed while waiting for a request slot")]
    RateLimitExceeded(Duration),

    #[error(transparent)]
    FalsePositive(#[from] FalsePositiveCommandError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("change set error: {0}")]
    ChangeSet(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
