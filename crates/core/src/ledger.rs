//! False-positive ledger — the sole owner of suppression state.
//!
//! Marks move through an explicit state machine:
//!
//! ```text
//! Active -(mark)-> PendingApproval -(approve)-> Suppressed -(expiry)-> Active
//!                  PendingApproval -(reject)--> Active
//! ```
//!
//! Expiry is evaluated lazily when a run applies the ledger to its findings;
//! expired marks stay in the ledger for audit history. Every mutation goes
//! through an optimistic version check so concurrent comment commands and
//! review runs cannot silently overwrite each other.

use crate::config::{Config, FalsePositiveConfig};
use crate::error::FalsePositiveCommandError;
use crate::finding::{Finding, FindingKey, FindingStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalState {
    PendingApproval,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalState::PendingApproval => write!(f, "pending-approval"),
            ApprovalState::Approved => write!(f, "approved"),
            ApprovalState::Rejected => write!(f, "rejected"),
        }
    }
}

/// A suppression mark for one finding key. Never deleted on expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalsePositiveMark {
    pub key: FindingKey,
    pub requested_by: String,
    pub reason: String,

    /// Unix seconds
    pub created_at: u64,
    pub expires_at: u64,

    pub state: ApprovalState,

    /// Who approved or rejected, once decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,

    /// Optimistic concurrency version, bumped on every mutation
    pub version: u64,
}

impl FalsePositiveMark {
    pub fn expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Whether this mark suppresses its finding right now.
    fn suppresses(&self, require_approval: bool, now: u64) -> bool {
        if self.expired(now) {
            return false;
        }
        match self.state {
            ApprovalState::Approved => true,
            ApprovalState::PendingApproval => !require_approval,
            ApprovalState::Rejected => false,
        }
    }
}

// ── Command parsing ──────────────────────────────────────────────

/// A successfully parsed suppression command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Exact check type as displayed in the report (e.g. "SQL Injection")
    pub check_type: String,
    pub file: String,
    pub line: usize,
    /// Free text following the location; may be empty
    pub reason: String,
}

/// Parse `@<bot> false-positive <CheckType> (file:line) [reason]`.
///
/// The bot token is case-insensitive; the command word, single spaces,
/// parentheses, and colon must match exactly. Any deviation is a
/// `BadSyntax` error and no state changes.
pub fn parse_command(
    comment: &str,
    command_prefix: &str,
) -> Result<ParsedCommand, FalsePositiveCommandError> {
    let (bot, command_word) = command_prefix.split_once(' ').ok_or_else(|| {
        FalsePositiveCommandError::BadSyntax("configured command has no command word".to_string())
    })?;

    let pattern = format!(
        r"(?s)^(?i:{}) {} ([^\n(]+?) \(([^():\s]+):([0-9]+)\)(?:\s+(.+))?$",
        regex::escape(bot),
        regex::escape(command_word),
    );
    // The pattern is built from escaped config fragments; it always compiles.
    let re = Regex::new(&pattern)
        .map_err(|e| FalsePositiveCommandError::BadSyntax(format!("bad command pattern: {}", e)))?;

    let caps = re.captures(comment.trim()).ok_or_else(|| {
        FalsePositiveCommandError::BadSyntax(format!(
            "expected `{} <CheckType> (file:line)`",
            command_prefix
        ))
    })?;

    let line: usize = caps[3]
        .parse()
        .map_err(|_| FalsePositiveCommandError::BadSyntax("line number out of range".to_string()))?;
    if line == 0 {
        return Err(FalsePositiveCommandError::BadSyntax(
            "line numbers are 1-indexed".to_string(),
        ));
    }

    Ok(ParsedCommand {
        check_type: caps[1].to_string(),
        file: caps[2].to_string(),
        line,
        reason: caps
            .get(4)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    })
}

/// Resolve a parsed command against the published finding set. The check
/// type must match the displayed type exactly and the location must match an
/// existing finding; otherwise the command is rejected without mutation.
pub fn resolve_command<'a>(
    cmd: &ParsedCommand,
    config: &Config,
    findings: &'a [Finding],
) -> Result<&'a Finding, FalsePositiveCommandError> {
    let unknown = || FalsePositiveCommandError::UnknownFinding {
        check: cmd.check_type.clone(),
        file: cmd.file.clone(),
        line: cmd.line,
    };
    let (check_id, _) = config.check_by_description(&cmd.check_type).ok_or_else(unknown)?;
    findings
        .iter()
        .find(|f| {
            f.key.check_id == *check_id && f.key.file == cmd.file && f.key.line == cmd.line
        })
        .ok_or_else(unknown)
}

// ── Storage ──────────────────────────────────────────────────────

/// Durable mark persistence. Loaded once at run start, written back on every
/// mutation. Comment-backed stores are external collaborators behind this
/// same seam.
pub trait MarkStore {
    fn load(&self) -> Result<Vec<FalsePositiveMark>, FalsePositiveCommandError>;
    fn save(&self, marks: &[FalsePositiveMark]) -> Result<(), FalsePositiveCommandError>;
}

const MARKS_FILE: &str = "marks.json";

#[derive(Debug, Serialize, Deserialize)]
struct MarksDocument {
    version: String,
    marks: Vec<FalsePositiveMark>,
}

/// JSON-file mark store under `.diffsentry/marks.json`.
pub struct FileMarkStore {
    path: PathBuf,
}

impl FileMarkStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(MARKS_FILE),
        }
    }
}

impl MarkStore for FileMarkStore {
    fn load(&self) -> Result<Vec<FalsePositiveMark>, FalsePositiveCommandError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| FalsePositiveCommandError::Storage(format!("read {}: {}", self.path.display(), e)))?;
        let doc: MarksDocument = serde_json::from_str(&data)
            .map_err(|e| FalsePositiveCommandError::Storage(format!("parse {}: {}", self.path.display(), e)))?;
        Ok(doc.marks)
    }

    fn save(&self, marks: &[FalsePositiveMark]) -> Result<(), FalsePositiveCommandError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FalsePositiveCommandError::Storage(format!("create {}: {}", parent.display(), e))
            })?;
        }
        let doc = MarksDocument {
            version: "1".to_string(),
            marks: marks.to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| FalsePositiveCommandError::Storage(format!("serialize marks: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| FalsePositiveCommandError::Storage(format!("write {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

// ── Ledger ───────────────────────────────────────────────────────

/// In-memory view over the mark store, enforcing the state machine.
pub struct Ledger<S: MarkStore> {
    store: S,
    config: FalsePositiveConfig,
    marks: Vec<FalsePositiveMark>,
}

impl<S: MarkStore> Ledger<S> {
    pub fn open(store: S, config: FalsePositiveConfig) -> Result<Self, FalsePositiveCommandError> {
        let marks = store.load()?;
        Ok(Self {
            store,
            config,
            marks,
        })
    }

    /// All marks, newest first. Includes expired and rejected history.
    pub fn marks(&self) -> &[FalsePositiveMark] {
        &self.marks
    }

    /// The most recent mark for a key, if any.
    pub fn latest_mark(&self, key: &FindingKey) -> Option<&FalsePositiveMark> {
        self.marks
            .iter()
            .filter(|m| &m.key == key)
            .max_by_key(|m| m.created_at)
    }

    /// Create a PendingApproval mark for a finding.
    ///
    /// Rejected when false positives are disabled, when the reason is empty
    /// while `include_reason` is set, or when a live mark already covers the
    /// key. A previously rejected or expired mark does not block a new one.
    pub fn submit(
        &mut self,
        key: &FindingKey,
        requested_by: &str,
        reason: &str,
        now: u64,
    ) -> Result<&FalsePositiveMark, FalsePositiveCommandError> {
        if !self.config.enabled {
            return Err(FalsePositiveCommandError::Disabled);
        }
        if self.config.include_reason && reason.trim().is_empty() {
            return Err(FalsePositiveCommandError::MissingReason);
        }
        if let Some(existing) = self.latest_mark(key) {
            let live = match existing.state {
                ApprovalState::PendingApproval => !existing.expired(now),
                ApprovalState::Approved => !existing.expired(now),
                ApprovalState::Rejected => false,
            };
            if live {
                return Err(FalsePositiveCommandError::InvalidTransition {
                    key: key.to_string(),
                    state: existing.state.to_string(),
                });
            }
        }

        let mark = FalsePositiveMark {
            key: key.clone(),
            requested_by: requested_by.to_string(),
            reason: reason.trim().to_string(),
            created_at: now,
            expires_at: now + u64::from(self.config.expiration) * SECONDS_PER_DAY,
            state: ApprovalState::PendingApproval,
            decided_by: None,
            version: 1,
        };
        self.marks.push(mark);
        self.persist(now)?;
        Ok(self.marks.last().unwrap())
    }

    /// PendingApproval → Approved. Maintainer-only when `require_approval`.
    pub fn approve(
        &mut self,
        key: &FindingKey,
        approver: &str,
        is_maintainer: bool,
        expected_version: u64,
        now: u64,
    ) -> Result<(), FalsePositiveCommandError> {
        self.decide(key, approver, is_maintainer, expected_version, now, ApprovalState::Approved)
    }

    /// PendingApproval → Rejected; the finding stays Active.
    pub fn reject(
        &mut self,
        key: &FindingKey,
        approver: &str,
        is_maintainer: bool,
        expected_version: u64,
        now: u64,
    ) -> Result<(), FalsePositiveCommandError> {
        self.decide(key, approver, is_maintainer, expected_version, now, ApprovalState::Rejected)
    }

    fn decide(
        &mut self,
        key: &FindingKey,
        approver: &str,
        is_maintainer: bool,
        expected_version: u64,
        now: u64,
        next: ApprovalState,
    ) -> Result<(), FalsePositiveCommandError> {
        if !self.config.enabled {
            return Err(FalsePositiveCommandError::Disabled);
        }
        if self.config.require_approval && !is_maintainer {
            return Err(FalsePositiveCommandError::PermissionDenied {
                user: approver.to_string(),
            });
        }

        let latest_created = self
            .marks
            .iter()
            .filter(|m| &m.key == key)
            .map(|m| m.created_at)
            .max()
            .ok_or_else(|| FalsePositiveCommandError::InvalidTransition {
                key: key.to_string(),
                state: "absent".to_string(),
            })?;
        let mark = self
            .marks
            .iter_mut()
            .find(|m| &m.key == key && m.created_at == latest_created)
            .unwrap();

        if mark.version != expected_version {
            return Err(FalsePositiveCommandError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
            });
        }
        if mark.state != ApprovalState::PendingApproval {
            return Err(FalsePositiveCommandError::InvalidTransition {
                key: key.to_string(),
                state: mark.state.to_string(),
            });
        }

        mark.state = next;
        mark.decided_by = Some(approver.to_string());
        mark.version += 1;
        self.persist(now)
    }

    /// Apply suppression state to the run's findings. Read-only on the
    /// ledger: expiry does not delete or rewrite marks.
    pub fn apply(&self, findings: &mut [Finding], now: u64) {
        for finding in findings {
            let mark = match self.latest_mark(&finding.key) {
                Some(mark) => mark,
                None => continue,
            };
            if mark.suppresses(self.config.require_approval, now) {
                finding.status = FindingStatus::Suppressed;
            } else if mark.expired(now) && mark.state != ApprovalState::Rejected {
                finding.status = FindingStatus::Expired;
            } else {
                finding.status = FindingStatus::Active;
            }
        }
    }

    fn persist(&mut self, now: u64) -> Result<(), FalsePositiveCommandError> {
        if !self.config.track_history {
            self.marks.retain(|m| {
                m.state == ApprovalState::PendingApproval
                    || (m.state == ApprovalState::Approved && !m.expired(now))
            });
        }
        self.store.save(&self.marks)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
