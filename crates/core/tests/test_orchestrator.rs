//! Tests for the analysis orchestrator: concurrency, retries, rate limiting,
//! cancellation, and response validation.

use diffsentry_core::{
    collect_gaps, AnalysisError, AnalysisProvider, AnalysisRequest, Chunk, ChunkResult, Config,
    Orchestrator, PipelineError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn config(overrides: &str) -> Config {
    let toml_str = format!(
        r#"
max_retries = 2
api_timeout = 5

[security_checks.sql_injection]
severity = "critical"
description = "SQL Injection"

[security_checks.xss]
severity = "high"
description = "Cross-Site Scripting"

[severity_levels.critical]
threshold = 0.9

[severity_levels.high]
threshold = 0.7

{}
"#,
        overrides
    );
    let config: Config = toml::from_str(&toml_str).unwrap();
    config.validate().unwrap();
    config
}

fn chunk(file: &str, start: usize, count: usize) -> Chunk {
    let lines = (0..count).map(|i| format!("line {}", start + i)).collect();
    Chunk::new(file, start, lines)
}

fn finding_json(file: &str, line: usize) -> String {
    format!(
        r#"[{{"check": "sql_injection", "confidence": 0.95, "file": "{}", "line": {}, "description": "query built from user input"}}]"#,
        file, line
    )
}

/// Scripted provider: pops the next canned response per call.
struct ScriptedProvider {
    responses: Mutex<Vec<Result<String, AnalysisError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<String, AnalysisError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AnalysisProvider for ScriptedProvider {
    fn analyze(&self, _request: &AnalysisRequest) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("[]".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ── Happy path ───────────────────────────────────────────────────

#[test]
fn test_outcomes_return_in_submission_order() {
    let config = config("");
    let provider = ScriptedProvider::new(Vec::new());
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let chunks = vec![chunk("a.py", 1, 5), chunk("b.py", 10, 5), chunk("c.py", 1, 5)];
    let outcomes = orchestrator.run(chunks).unwrap();

    assert_eq!(outcomes.len(), 3);
    let order: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert_eq!(provider.calls(), 3);
}

#[test]
fn test_valid_findings_pass_through() {
    let config = config("");
    let provider = ScriptedProvider::new(vec![Ok(finding_json("db.py", 42))]);
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator.run(vec![chunk("db.py", 40, 10)]).unwrap();
    match &outcomes[0].result {
        ChunkResult::Findings(findings) => {
            assert_eq!(findings.len(), 1);
            assert_eq!(findings[0].check, "sql_injection");
            assert_eq!(findings[0].line, 42);
        }
        ChunkResult::Incomplete { error, .. } => panic!("unexpected gap: {}", error),
    }
    assert!(outcomes[0].warnings.is_empty());
}

// ── Concurrency ──────────────────────────────────────────────────

/// Provider that records the highest number of in-flight requests it saw.
struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl AnalysisProvider for ConcurrencyProbe {
    fn analyze(&self, _request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok("[]".to_string())
    }
}

#[test]
fn test_in_flight_requests_never_exceed_bound() {
    let config = config("[performance]\nmax_concurrent_requests = 2");
    let provider = ConcurrencyProbe {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    };
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let chunks = (0..8).map(|i| chunk("a.py", i * 10 + 1, 5)).collect();
    let outcomes = orchestrator.run(chunks).unwrap();

    assert_eq!(outcomes.len(), 8);
    assert!(provider.peak.load(Ordering::SeqCst) <= 2);
}

// ── Retries and gaps ─────────────────────────────────────────────

#[test]
fn test_transient_failure_retried_then_succeeds() {
    let config = config("");
    let provider = ScriptedProvider::new(vec![
        Err(AnalysisError::Timeout(Duration::from_secs(5))),
        Ok(finding_json("db.py", 42)),
    ]);
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator.run(vec![chunk("db.py", 40, 10)]).unwrap();
    assert!(matches!(&outcomes[0].result, ChunkResult::Findings(f) if f.len() == 1));
    assert_eq!(provider.calls(), 2);
}

#[test]
fn test_malformed_response_is_retried() {
    let config = config("");
    let provider = ScriptedProvider::new(vec![
        Ok("I could not analyze this code.".to_string()),
        Ok("[]".to_string()),
    ]);
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator.run(vec![chunk("a.py", 1, 5)]).unwrap();
    assert!(matches!(&outcomes[0].result, ChunkResult::Findings(f) if f.is_empty()));
    assert_eq!(provider.calls(), 2);
}

#[test]
fn test_exhausted_retries_become_coverage_gap() {
    // max_retries = 2, so 3 attempts total
    let config = config("");
    let provider = ScriptedProvider::new(vec![
        Err(AnalysisError::Provider("503".to_string())),
        Err(AnalysisError::Provider("503".to_string())),
        Err(AnalysisError::Provider("503".to_string())),
    ]);
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator.run(vec![chunk("db.py", 40, 10)]).unwrap();
    match &outcomes[0].result {
        ChunkResult::Incomplete { attempts, error } => {
            assert_eq!(*attempts, 3);
            assert!(error.contains("503"), "error was: {}", error);
        }
        ChunkResult::Findings(_) => panic!("expected a gap"),
    }
    assert_eq!(provider.calls(), 3);

    let gaps = collect_gaps(&outcomes);
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].file, "db.py");
    assert_eq!(gaps[0].start_line, 40);
    assert_eq!(gaps[0].attempts, 3);
}

// ── Record validation ────────────────────────────────────────────

#[test]
fn test_invalid_records_discarded_with_warnings() {
    let config = config("");
    // one good record, one missing confidence, one outside the chunk
    let response = r#"[
        {"check": "sql_injection", "confidence": 0.95, "file": "db.py", "line": 42, "description": "ok"},
        {"check": "sql_injection", "file": "db.py", "line": 43, "description": "no confidence"},
        {"check": "sql_injection", "confidence": 0.95, "file": "db.py", "line": 999, "description": "out of range"}
    ]"#;
    let provider = ScriptedProvider::new(vec![Ok(response.to_string())]);
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator.run(vec![chunk("db.py", 40, 10)]).unwrap();
    match &outcomes[0].result {
        ChunkResult::Findings(findings) => {
            assert_eq!(findings.len(), 1);
            assert_eq!(findings[0].line, 42);
        }
        ChunkResult::Incomplete { error, .. } => panic!("unexpected gap: {}", error),
    }
    // a discarded record is a warning, never a chunk failure
    assert_eq!(outcomes[0].warnings.len(), 2);
    // and discarding does not consume a retry
    assert_eq!(provider.calls(), 1);
}

#[test]
fn test_unknown_check_id_discarded() {
    let config = config("");
    let response = r#"[{"check": "made_up_check", "confidence": 0.95, "file": "a.py", "line": 2, "description": "??"}]"#;
    let provider = ScriptedProvider::new(vec![Ok(response.to_string())]);
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator.run(vec![chunk("a.py", 1, 5)]).unwrap();
    assert!(matches!(&outcomes[0].result, ChunkResult::Findings(f) if f.is_empty()));
    assert_eq!(outcomes[0].warnings.len(), 1);
}

// ── Rate limiting ────────────────────────────────────────────────

/// Provider that records when each call was dispatched.
struct TimestampingProvider {
    calls: Mutex<Vec<Instant>>,
}

impl AnalysisProvider for TimestampingProvider {
    fn analyze(&self, _request: &AnalysisRequest) -> Result<String, AnalysisError> {
        self.calls.lock().unwrap().push(Instant::now());
        Ok("[]".to_string())
    }
}

#[test]
fn test_rolling_window_never_admits_more_than_configured_requests() {
    let config = config(
        r#"[performance]
max_concurrent_requests = 4

[performance.rate_limit]
requests = 2
window = 1
"#,
    );
    let provider = TimestampingProvider {
        calls: Mutex::new(Vec::new()),
    };
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let chunks = (0..6).map(|i| chunk("a.py", i * 10 + 1, 5)).collect();
    let outcomes = orchestrator.run(chunks).unwrap();
    assert_eq!(outcomes.len(), 6);
    assert!(outcomes
        .iter()
        .all(|o| matches!(&o.result, ChunkResult::Findings(_))));

    let mut timestamps = provider.calls.into_inner().unwrap();
    timestamps.sort();
    assert_eq!(timestamps.len(), 6);
    // Any two calls with two others between them must span the window.
    // Slack of 100ms absorbs the gap between admission and dispatch.
    for pair in timestamps.windows(3) {
        assert!(
            pair[2].duration_since(pair[0]) >= Duration::from_millis(900),
            "three calls within one rolling window"
        );
    }
}

// ── Cancellation and deadlines ───────────────────────────────────

#[test]
fn test_cancelled_run_reports_unanalyzed_chunks() {
    let config = config("");
    let provider = ScriptedProvider::new(Vec::new());
    let cancel = AtomicBool::new(true);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    let outcomes = orchestrator
        .run(vec![chunk("a.py", 1, 5), chunk("b.py", 1, 5)])
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(matches!(&outcome.result, ChunkResult::Incomplete { .. }));
    }
    assert_eq!(provider.calls(), 0);
    assert_eq!(collect_gaps(&outcomes).len(), 2);
}

#[test]
fn test_run_deadline_while_rate_limited_fails_the_run() {
    let config = config(
        r#"[performance]
max_concurrent_requests = 2
run_timeout = 1

[performance.rate_limit]
requests = 1
window = 60
"#,
    );
    let provider = ScriptedProvider::new(Vec::new());
    let cancel = AtomicBool::new(false);
    let orchestrator = Orchestrator::new(&config, &provider, &cancel);

    // one admitted request, then the second waits out the 1s deadline
    let err = orchestrator
        .run(vec![chunk("a.py", 1, 5), chunk("b.py", 1, 5)])
        .unwrap_err();
    assert!(matches!(err, PipelineError::RateLimitExceeded(_)));
}
