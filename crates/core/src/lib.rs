//! Diffsentry Core - Finding Pipeline Engine
//!
//! This crate turns a raw change set into a vetted, deduplicated,
//! severity-ranked set of security findings:
//! - Change-set ingestion and bounded diff chunking
//! - Concurrent, rate-limited dispatch to an LLM analysis provider
//! - Confidence/severity filtering and key-based deduplication
//! - The approval-gated false-positive ledger
//! - Staged, idempotent report publishing

pub mod changeset;
pub mod chunker;
pub mod config;
pub mod error;
pub mod filter;
pub mod finding;
pub mod ledger;
pub mod orchestrator;
pub mod report;

pub use changeset::{ChangeSet, ChangeSetReader, ChangedFile, LineRange};
pub use chunker::{chunk_files, Chunk};
pub use config::{CheckDefinition, Config, SeverityLevel};
pub use error::{
    AnalysisError, ConfigError, FalsePositiveCommandError, PipelineError, PublishError,
};
pub use filter::{collect_gaps, filter_outcomes, FilterOutcome};
pub use finding::{
    Conclusion, CoverageGap, Finding, FindingKey, FindingStatus, RawFinding, ReviewRun,
};
pub use ledger::{
    parse_command, resolve_command, ApprovalState, FalsePositiveMark, FileMarkStore, Ledger,
    MarkStore, ParsedCommand,
};
pub use orchestrator::{AnalysisProvider, AnalysisRequest, ChunkOutcome, ChunkResult, Orchestrator};
pub use report::{extract_marker, RenderedFinding, RenderedReport, ReportPublisher, ReportSink};

/// Diffsentry version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// State directory name for marks and run logs, relative to the repo root.
pub const STATE_DIR: &str = ".diffsentry";
