//! Finding types that bridge provider output to the filter, ledger, and report

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::Config;

/// Short hex SHA-256 of arbitrary content. Used for chunk checksums and the
/// content component of finding keys.
pub fn content_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex_encode(&hash[..8])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// An unvalidated finding as returned by the analysis provider.
///
/// Untrusted input: deserialized leniently and then checked against the
/// configuration before it may become a [`Finding`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    pub check: String,
    pub confidence: f64,
    pub file: String,
    pub line: usize,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggested_fix: Option<String>,
}

impl RawFinding {
    /// Deserialize a single provider record. Returns the rejection reason on
    /// schema mismatch so callers can log a warning instead of crashing.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| format!("schema mismatch: {}", e))
    }

    /// Validate against the run configuration: the check id must be known,
    /// confidence in [0, 1], and the location present.
    pub fn validate(&self, config: &Config) -> Result<(), String> {
        if !config.security_checks.contains_key(&self.check) {
            return Err(format!("unknown check id `{}`", self.check));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        if self.file.trim().is_empty() {
            return Err("missing file".to_string());
        }
        if self.line == 0 {
            return Err("line must be 1-indexed".to_string());
        }
        Ok(())
    }
}

/// Canonical identity of a finding: check, location, and a checksum of the
/// flagged source line. Two raw findings from overlapping chunk windows
/// collapse onto the same key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FindingKey {
    pub check_id: String,
    pub file: String,
    pub line: usize,
    pub checksum: String,
}

impl FindingKey {
    /// Stable short identifier embedded in published output for idempotent
    /// re-run detection.
    pub fn marker(&self) -> String {
        content_checksum(&format!(
            "{}\x1f{}\x1f{}\x1f{}",
            self.check_id, self.file, self.line, self.checksum
        ))
    }
}

impl std::fmt::Display for FindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{} [{}]",
            self.check_id, self.file, self.line, self.checksum
        )
    }
}

/// Suppression status of a canonical finding.
///
/// `Expired` marks a finding whose suppression lapsed; it counts toward the
/// conclusion exactly like `Active` but is annotated in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingStatus {
    Active,
    Suppressed,
    Expired,
}

impl FindingStatus {
    /// Whether the finding participates in the Pass/Fail conclusion.
    pub fn counts_for_conclusion(&self) -> bool {
        !matches!(self, FindingStatus::Suppressed)
    }
}

/// A canonical, deduplicated security finding. Created by the filter;
/// only the false-positive ledger mutates `status` afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub key: FindingKey,

    /// Severity level name from the check definition
    pub severity: String,

    pub confidence: f64,

    /// Display type from the check definition (e.g. "SQL Injection")
    pub check_type: String,

    pub owasp: String,
    pub cwe: String,
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,

    pub status: FindingStatus,
}

/// Overall result of a review run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conclusion {
    Pass,
    Fail,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conclusion::Pass => write!(f, "pass"),
            Conclusion::Fail => write!(f, "fail"),
        }
    }
}

/// A chunk whose analysis could not be completed after exhausting retries.
/// Always reported; never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageGap {
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub attempts: u32,
    pub error: String,
}

/// One complete review: the vetted finding set plus coverage gaps and the
/// computed conclusion. Immutable after publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRun {
    /// Change-set identifier (e.g. a PR number or branch ref)
    pub change_set: String,

    /// Commit under review
    pub commit: String,

    pub findings: Vec<Finding>,

    pub coverage_gaps: Vec<CoverageGap>,

    pub conclusion: Conclusion,
}

impl ReviewRun {
    pub fn active_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status.counts_for_conclusion())
            .count()
    }

    pub fn suppressed_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status == FindingStatus::Suppressed)
            .count()
    }
}
