//! End-to-end tests for the `fp` subcommands against a temp repo layout.

use diffsentry_cli::commands::fp::{self, FpAction};
use diffsentry_cli::{run_log, Cli};
use diffsentry_core::ledger::FileMarkStore;
use diffsentry_core::{
    ApprovalState, Conclusion, Finding, FindingKey, FindingStatus, Ledger, MarkStore, ReviewRun,
    STATE_DIR,
};
use std::path::Path;

const CONFIG: &str = r#"
[security_checks.sql_injection]
severity = "critical"
description = "SQL Injection"

[severity_levels.critical]
threshold = 0.9

[false_positives]
command = "@diffsentry false-positive"
require_approval = true
"#;

fn setup(dir: &Path) -> Cli {
    let config_path = dir.join(".diffsentry.toml");
    std::fs::write(&config_path, CONFIG).unwrap();

    let run = ReviewRun {
        change_set: "pr-17".to_string(),
        commit: "deadbeef".to_string(),
        findings: vec![Finding {
            key: FindingKey {
                check_id: "sql_injection".to_string(),
                file: "db.py".to_string(),
                line: 42,
                checksum: "aabbccdd00112233".to_string(),
            },
            severity: "critical".to_string(),
            confidence: 0.95,
            check_type: "SQL Injection".to_string(),
            owasp: String::new(),
            cwe: String::new(),
            description: "query built from user input".to_string(),
            suggested_fix: None,
            status: FindingStatus::Active,
        }],
        coverage_gaps: Vec::new(),
        conclusion: Conclusion::Fail,
    };
    run_log::save_run(dir, "1000", &run).unwrap();

    Cli {
        command: None,
        repo: Some(dir.to_path_buf()),
        config: Some(config_path),
    }
}

fn marks(dir: &Path) -> Vec<diffsentry_core::FalsePositiveMark> {
    FileMarkStore::new(&dir.join(STATE_DIR)).load().unwrap()
}

#[test]
fn test_mark_then_approve() {
    let dir = tempfile::tempdir().unwrap();
    let cli = setup(dir.path());

    fp::run(
        &FpAction::Mark {
            comment: "@diffsentry false-positive SQL Injection (db.py:42) seeded test data"
                .to_string(),
            user: "alice".to_string(),
        },
        &cli,
    )
    .unwrap();

    let recorded = marks(dir.path());
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].state, ApprovalState::PendingApproval);
    assert_eq!(recorded[0].requested_by, "alice");
    assert_eq!(recorded[0].reason, "seeded test data");

    fp::run(
        &FpAction::Approve {
            location: "SQL Injection (db.py:42)".to_string(),
            user: "maintainer".to_string(),
        },
        &cli,
    )
    .unwrap();

    let recorded = marks(dir.path());
    assert_eq!(recorded[0].state, ApprovalState::Approved);
    assert_eq!(recorded[0].decided_by.as_deref(), Some("maintainer"));
    assert_eq!(recorded[0].version, 2);
}

#[test]
fn test_mark_unknown_location_fails_without_state() {
    let dir = tempfile::tempdir().unwrap();
    let cli = setup(dir.path());

    let err = fp::run(
        &FpAction::Mark {
            comment: "@diffsentry false-positive SQL Injection (db.py:43) wrong line".to_string(),
            user: "alice".to_string(),
        },
        &cli,
    )
    .unwrap_err();
    assert!(err.to_string().contains("no finding"), "got: {}", err);
    assert!(marks(dir.path()).is_empty());
}

#[test]
fn test_mark_without_reason_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cli = setup(dir.path());

    let err = fp::run(
        &FpAction::Mark {
            comment: "@diffsentry false-positive SQL Injection (db.py:42)".to_string(),
            user: "alice".to_string(),
        },
        &cli,
    )
    .unwrap_err();
    assert!(err.to_string().contains("reason"), "got: {}", err);
    assert!(marks(dir.path()).is_empty());
}

#[test]
fn test_reject_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let cli = setup(dir.path());

    fp::run(
        &FpAction::Mark {
            comment: "@diffsentry false-positive SQL Injection (db.py:42) not exploitable"
                .to_string(),
            user: "alice".to_string(),
        },
        &cli,
    )
    .unwrap();
    fp::run(
        &FpAction::Reject {
            location: "SQL Injection (db.py:42)".to_string(),
            user: "maintainer".to_string(),
        },
        &cli,
    )
    .unwrap();

    let recorded = marks(dir.path());
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].state, ApprovalState::Rejected);

    // a rejected mark never suppresses on a later run
    let ledger = Ledger::open(
        FileMarkStore::new(&dir.path().join(STATE_DIR)),
        diffsentry_core::config::FalsePositiveConfig::default(),
    )
    .unwrap();
    let run = run_log::load_run(dir.path(), "1000").unwrap();
    let mut findings = run.run.findings;
    ledger.apply(&mut findings, diffsentry_core::ledger::unix_now());
    assert_eq!(findings[0].status, FindingStatus::Active);
}
