//! Tests for threshold gating, enablement, and key-based deduplication

use diffsentry_core::{
    filter_outcomes, Chunk, ChunkOutcome, ChunkResult, Config, FindingStatus, RawFinding,
};

fn config() -> Config {
    let toml_str = r#"
confidence_threshold = 0.7

[security_checks.sql_injection]
severity = "critical"
description = "SQL Injection"
owasp = "A03:2021"
cwe = "CWE-89"
confidence_threshold = 0.8

[security_checks.debug_code]
enabled = false
severity = "low"
description = "Debug Code"

[security_checks.weak_hash]
severity = "low"
description = "Weak Hash Algorithm"

[severity_levels.critical]
threshold = 0.9
color = "red"

[severity_levels.low]
enabled = false
threshold = 0.0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    config.validate().unwrap();
    config
}

fn chunk_at(file: &str, start: usize, lines: &[&str]) -> Chunk {
    Chunk::new(file, start, lines.iter().map(|s| s.to_string()).collect())
}

fn outcome(index: usize, chunk: Chunk, raws: Vec<RawFinding>) -> ChunkOutcome {
    ChunkOutcome {
        index,
        chunk,
        result: ChunkResult::Findings(raws),
        warnings: vec![],
    }
}

fn raw(check: &str, confidence: f64, file: &str, line: usize) -> RawFinding {
    RawFinding {
        check: check.to_string(),
        confidence,
        file: file.to_string(),
        line,
        description: "found".to_string(),
        suggested_fix: None,
    }
}

#[test]
fn test_below_effective_threshold_dropped() {
    // check 0.8, severity critical 0.9, global 0.7 → effective 0.9
    let chunk = chunk_at("db.py", 40, &["a", "b", "query(user_input)", "d"]);
    let outcomes = vec![outcome(0, chunk, vec![raw("sql_injection", 0.85, "db.py", 42)])];

    let result = filter_outcomes(&outcomes, &config());
    assert!(result.findings.is_empty());
    assert_eq!(result.dropped.len(), 1);
    assert!(result.dropped[0].reason.contains("0.90"));
}

#[test]
fn test_above_effective_threshold_kept() {
    let chunk = chunk_at("db.py", 40, &["a", "b", "query(user_input)", "d"]);
    let outcomes = vec![outcome(0, chunk, vec![raw("sql_injection", 0.95, "db.py", 42)])];

    let result = filter_outcomes(&outcomes, &config());
    assert_eq!(result.findings.len(), 1);
    let f = &result.findings[0];
    assert_eq!(f.severity, "critical");
    assert_eq!(f.check_type, "SQL Injection");
    assert_eq!(f.key.line, 42);
    assert_eq!(f.status, FindingStatus::Active);
    assert_eq!(f.owasp, "A03:2021");
}

#[test]
fn test_disabled_check_dropped() {
    let chunk = chunk_at("app.py", 1, &["print('debug')"]);
    let outcomes = vec![outcome(0, chunk, vec![raw("debug_code", 0.99, "app.py", 1)])];

    let result = filter_outcomes(&outcomes, &config());
    assert!(result.findings.is_empty());
    assert_eq!(result.dropped[0].reason, "check disabled");
}

#[test]
fn test_disabled_severity_dropped() {
    // weak_hash is enabled but its whole severity level is disabled
    let chunk = chunk_at("auth.py", 1, &["md5(password)"]);
    let outcomes = vec![outcome(0, chunk, vec![raw("weak_hash", 0.99, "auth.py", 1)])];

    let result = filter_outcomes(&outcomes, &config());
    assert!(result.findings.is_empty());
    assert!(result.dropped[0].reason.contains("severity"));
}

#[test]
fn test_overlapping_chunks_dedup_highest_confidence() {
    // Two chunks overlap around line 42; the same source line yields the
    // same key, and the higher confidence record wins.
    let chunk_a = chunk_at("db.py", 35, &["x"; 10]);
    let chunk_b = chunk_at("db.py", 40, &["x"; 10]);
    let outcomes = vec![
        outcome(0, chunk_a, vec![raw("sql_injection", 0.92, "db.py", 42)]),
        outcome(1, chunk_b, vec![raw("sql_injection", 0.97, "db.py", 42)]),
    ];

    let result = filter_outcomes(&outcomes, &config());
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].confidence, 0.97);
}

#[test]
fn test_dedup_tie_keeps_first_seen() {
    let chunk_a = chunk_at("db.py", 35, &["x"; 10]);
    let chunk_b = chunk_at("db.py", 40, &["x"; 10]);
    let mut first = raw("sql_injection", 0.95, "db.py", 42);
    first.description = "from first chunk".to_string();
    let mut second = raw("sql_injection", 0.95, "db.py", 42);
    second.description = "from second chunk".to_string();

    let outcomes = vec![
        outcome(0, chunk_a, vec![first]),
        outcome(1, chunk_b, vec![second]),
    ];

    let result = filter_outcomes(&outcomes, &config());
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].description, "from first chunk");
}

#[test]
fn test_different_lines_are_distinct_findings() {
    let chunk = chunk_at("db.py", 40, &["q1", "q2", "q3", "q4", "q5"]);
    let outcomes = vec![outcome(
        0,
        chunk,
        vec![
            raw("sql_injection", 0.95, "db.py", 41),
            raw("sql_injection", 0.95, "db.py", 43),
        ],
    )];

    let result = filter_outcomes(&outcomes, &config());
    assert_eq!(result.findings.len(), 2);
}
