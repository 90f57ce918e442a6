//! Dispatches chunks to the analysis provider under concurrency, timeout,
//! retry, and rate-limit constraints.
//!
//! One run drives a single bounded worker pool over a FIFO chunk queue. The
//! pool size is the concurrency bound; the sliding-window rate limiter is the
//! only coordination point shared between workers, and it registers a request
//! atomically with admission. A chunk whose attempts are exhausted becomes a
//! coverage gap in the report, never a silent drop.

use crate::chunker::Chunk;
use crate::config::Config;
use crate::error::{AnalysisError, PipelineError};
use crate::finding::RawFinding;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One analysis request, fully rendered. The provider only transports it.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub user_prompt: String,
    pub timeout: Duration,
}

/// Outbound seam to the external analysis provider. Implementations live at
/// the edges (HTTP clients, test mocks) and must be shareable across the
/// worker pool.
pub trait AnalysisProvider: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError>;
}

/// Result of analyzing one chunk.
#[derive(Debug)]
pub enum ChunkResult {
    /// Schema-valid raw findings (possibly empty)
    Findings(Vec<RawFinding>),

    /// Retries exhausted or run cancelled; reported as a coverage gap
    Incomplete { attempts: u32, error: String },
}

#[derive(Debug)]
pub struct ChunkOutcome {
    /// Submission-order index, used downstream for deterministic tie-breaks
    pub index: usize,

    pub chunk: Chunk,

    pub result: ChunkResult,

    /// Provider records discarded during schema validation
    pub warnings: Vec<String>,
}

enum Admission {
    Admitted,
    Cancelled,
    DeadlineExceeded,
}

/// Sliding-window rate limiter shared by all workers.
struct RateLimiter {
    admitted: Mutex<VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            admitted: Mutex::new(VecDeque::new()),
            max_requests,
            window,
        }
    }

    /// Block until the window has room, registering the request in the same
    /// critical section that admits it. Requests past `deadline` fail the
    /// run rather than being rejected individually.
    fn acquire(&self, deadline: Option<Instant>, cancel: &AtomicBool) -> Admission {
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Admission::Cancelled;
            }
            {
                let mut admitted = self.admitted.lock().unwrap();
                let now = Instant::now();
                while let Some(&front) = admitted.front() {
                    if now.duration_since(front) >= self.window {
                        admitted.pop_front();
                    } else {
                        break;
                    }
                }
                if admitted.len() < self.max_requests {
                    admitted.push_back(now);
                    return Admission::Admitted;
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Admission::DeadlineExceeded;
                }
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}

/// Runs the analysis phase of a review.
pub struct Orchestrator<'a> {
    config: &'a Config,
    provider: &'a dyn AnalysisProvider,
    cancel: &'a AtomicBool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        provider: &'a dyn AnalysisProvider,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            config,
            provider,
            cancel,
        }
    }

    /// Analyze every chunk. Returns outcomes sorted back into submission
    /// order; completion order across workers is unordered by design.
    pub fn run(&self, chunks: Vec<Chunk>) -> Result<Vec<ChunkOutcome>, PipelineError> {
        let deadline = self.config.run_deadline().map(|d| Instant::now() + d);
        let limiter = RateLimiter::new(
            self.config.performance.rate_limit.requests as usize,
            Duration::from_secs(self.config.performance.rate_limit.window),
        );

        let queue: Mutex<VecDeque<(usize, Chunk)>> =
            Mutex::new(chunks.into_iter().enumerate().collect());
        let outcomes: Mutex<Vec<ChunkOutcome>> = Mutex::new(Vec::new());
        let fatal: Mutex<Option<PipelineError>> = Mutex::new(None);

        let workers = self
            .config
            .performance
            .max_concurrent_requests
            .min(queue.lock().unwrap().len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(&queue, &outcomes, &limiter, deadline, &fatal));
            }
        });

        if let Some(err) = fatal.into_inner().unwrap() {
            return Err(err);
        }

        let mut outcomes = outcomes.into_inner().unwrap();
        outcomes.sort_by_key(|o| o.index);
        Ok(outcomes)
    }

    fn worker(
        &self,
        queue: &Mutex<VecDeque<(usize, Chunk)>>,
        outcomes: &Mutex<Vec<ChunkOutcome>>,
        limiter: &RateLimiter,
        deadline: Option<Instant>,
        fatal: &Mutex<Option<PipelineError>>,
    ) {
        loop {
            let (index, chunk) = match queue.lock().unwrap().pop_front() {
                Some(item) => item,
                None => return,
            };

            let request = self.build_request(&chunk);
            let total_attempts = self.config.max_retries + 1;
            let mut result = None;
            let mut warnings = Vec::new();
            let mut attempts_made = 0;
            let mut last_error = "cancelled before dispatch".to_string();

            for attempt in 0..total_attempts {
                if attempt > 0 {
                    sleep_backoff(attempt, self.cancel);
                }
                match limiter.acquire(deadline, self.cancel) {
                    Admission::Admitted => {}
                    Admission::Cancelled => {
                        last_error = "cancelled".to_string();
                        break;
                    }
                    Admission::DeadlineExceeded => {
                        let mut slot = fatal.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(PipelineError::RateLimitExceeded(
                                self.config.run_deadline().unwrap_or_default(),
                            ));
                        }
                        self.cancel.store(true, Ordering::SeqCst);
                        last_error = "run deadline exceeded while rate-limited".to_string();
                        break;
                    }
                }

                attempts_made = attempt + 1;
                let attempt_result = self
                    .provider
                    .analyze(&request)
                    .and_then(|text| parse_provider_response(&text));
                match attempt_result {
                    Ok(values) => {
                        let (findings, warns) = self.validate_records(&chunk, values);
                        warnings = warns;
                        result = Some(ChunkResult::Findings(findings));
                        break;
                    }
                    Err(e) => last_error = e.to_string(),
                }
            }

            let result = result.unwrap_or(ChunkResult::Incomplete {
                attempts: attempts_made,
                error: last_error,
            });
            outcomes.lock().unwrap().push(ChunkOutcome {
                index,
                chunk,
                result,
                warnings,
            });
        }
    }

    /// Render the request for one chunk: enabled check definitions as hints,
    /// then the chunk content with absolute line numbers.
    fn build_request(&self, chunk: &Chunk) -> AnalysisRequest {
        let mut hints = String::new();
        for (id, check) in self.config.enabled_checks() {
            hints.push_str(&format!(
                "- {} \"{}\" (severity {})",
                id, check.description, check.severity
            ));
            if !check.patterns.is_empty() {
                hints.push_str(&format!("\n  patterns: {}", check.patterns.join(", ")));
            }
            hints.push('\n');
        }

        let user_prompt = format!(
            "Checks to apply:\n{}\nFile: {} (lines {}-{})\n\n{}",
            hints,
            chunk.file,
            chunk.start_line,
            chunk.end_line() - 1,
            chunk.numbered_content()
        );

        AnalysisRequest {
            model: self.config.ai_model.model.clone(),
            temperature: self.config.ai_model.temperature,
            max_tokens: self.config.ai_model.max_tokens,
            system_prompt: self.config.ai_model.system_prompt.clone(),
            user_prompt,
            timeout: self.config.request_timeout(),
        }
    }

    /// Schema-validate each provider record. Invalid records are discarded
    /// with a warning; they never fail the chunk.
    fn validate_records(&self, chunk: &Chunk, values: Vec<Value>) -> (Vec<RawFinding>, Vec<String>) {
        let mut findings = Vec::new();
        let mut warnings = Vec::new();
        for value in &values {
            let raw = match RawFinding::from_value(value) {
                Ok(raw) => raw,
                Err(reason) => {
                    warnings.push(format!("{} (chunk {}:{})", reason, chunk.file, chunk.start_line));
                    continue;
                }
            };
            if let Err(reason) = raw.validate(self.config) {
                warnings.push(format!(
                    "discarded finding at {}:{}: {}",
                    raw.file, raw.line, reason
                ));
                continue;
            }
            if raw.file != chunk.file || chunk.line_text(raw.line).is_none() {
                warnings.push(format!(
                    "discarded finding outside chunk bounds: {}:{} (chunk {}:{}-{})",
                    raw.file,
                    raw.line,
                    chunk.file,
                    chunk.start_line,
                    chunk.end_line() - 1
                ));
                continue;
            }
            findings.push(raw);
        }
        (findings, warnings)
    }
}

/// Parse the provider's response text into a JSON array of records.
///
/// Tolerates markdown fences and a single object wrapper around the array;
/// anything else is a malformed response, which the caller treats as a
/// retryable attempt failure.
pub fn parse_provider_response(content: &str) -> Result<Vec<Value>, AnalysisError> {
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(values) = serde_json::from_str::<Vec<Value>>(json_str) {
        return Ok(values);
    }

    // Some models wrap the array in an object
    if let Ok(obj) = serde_json::from_str::<Value>(json_str) {
        for key in ["findings", "results", "issues", "vulnerabilities"] {
            if let Some(Value::Array(arr)) = obj.get(key) {
                return Ok(arr.clone());
            }
        }
    }

    Err(AnalysisError::MalformedResponse(
        first_line(json_str).to_string(),
    ))
}

fn first_line(text: &str) -> &str {
    let line = text.lines().next().unwrap_or("");
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

/// Exponential backoff before retry `attempt` (1-indexed), capped, polling
/// the cancellation flag while sleeping.
fn sleep_backoff(attempt: u32, cancel: &AtomicBool) {
    let millis = 200u64.saturating_mul(1 << (attempt - 1).min(5)).min(5_000);
    let mut remaining = Duration::from_millis(millis);
    while !remaining.is_zero() && !cancel.load(Ordering::SeqCst) {
        let slice = remaining.min(Duration::from_millis(50));
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}
