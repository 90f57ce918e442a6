//! Configuration file parsing for .diffsentry.toml
//!
//! Loaded and validated once per run; the resulting [`Config`] is immutable
//! and passed explicitly to every pipeline stage. Unknown keys are ignored;
//! missing required keys or out-of-range values fail with a fatal
//! [`ConfigError`] before any analysis starts.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// A security check definition passed to the analysis provider as a hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDefinition {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of a `[severity_levels.*]` entry
    pub severity: String,

    /// Human-readable check type shown in reports (e.g. "SQL Injection").
    /// Suppression commands must quote this string exactly.
    pub description: String,

    /// OWASP Top 10 reference (e.g. "A03:2021")
    #[serde(default)]
    pub owasp: String,

    /// CWE reference (e.g. "CWE-89")
    #[serde(default)]
    pub cwe: String,

    /// Per-check confidence floor; combined with the severity and global
    /// floors by taking the strictest
    #[serde(default)]
    pub confidence_threshold: f64,

    /// Ordered pattern hints forwarded verbatim to the provider
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A severity level. Disabling a level suppresses all findings of that
/// severity regardless of confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityLevel {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Confidence floor applied to every finding at this severity
    #[serde(default)]
    pub threshold: f64,

    /// Presentation color for terminal output ("red", "yellow", ...)
    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiModelConfig {
    /// LLM provider ("anthropic" or "openai")
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max requests admitted per sliding window
    #[serde(default = "default_rate_requests")]
    pub requests: u32,

    /// Window length in seconds
    #[serde(default = "default_rate_window")]
    pub window: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_concurrency")]
    pub max_concurrent_requests: usize,

    /// Per-request timeout in seconds; falls back to the top-level
    /// `api_timeout` when absent
    #[serde(default)]
    pub request_timeout: Option<u64>,

    /// Whole-run deadline in seconds; 0 = unlimited. Waiting on the rate
    /// limiter past this deadline fails the run with `RateLimitExceeded`.
    #[serde(default)]
    pub run_timeout: u64,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalsePositiveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command prefix matched against incoming comments. The leading
    /// `@token` is case-insensitive; everything else is exact.
    #[serde(default = "default_fp_command")]
    pub command: String,

    /// Mark storage backend ("file" is the built-in)
    #[serde(default = "default_fp_storage")]
    pub storage: String,

    /// Days until an approved mark expires
    #[serde(default = "default_fp_expiration")]
    pub expiration: u32,

    /// When true, only maintainers may approve or reject marks
    #[serde(default = "default_true")]
    pub require_approval: bool,

    /// Keep expired and rejected marks in the ledger
    #[serde(default = "default_true")]
    pub track_history: bool,

    /// Reject mark commands that carry no reason text
    #[serde(default = "default_true")]
    pub include_reason: bool,
}

/// Top-level configuration. `security_checks` and `severity_levels` are
/// required; everything else has defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global confidence floor for all findings
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f64,

    /// Max lines per analysis chunk
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    /// Retries per chunk after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default per-request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub api_timeout: u64,

    /// Glob patterns for changed files to skip entirely (lockfiles,
    /// generated code, vendored trees)
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    #[serde(default)]
    pub ai_model: AiModelConfig,

    pub security_checks: BTreeMap<String, CheckDefinition>,

    pub severity_levels: BTreeMap<String, SeverityLevel>,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub false_positives: FalsePositiveConfig,
}

// Default functions

fn default_true() -> bool {
    true
}

fn default_color() -> String {
    "white".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_system_prompt() -> String {
    r#"You are a security reviewer analyzing a chunk of changed source code.
Report only concrete vulnerabilities matching the provided check definitions.

Respond with a JSON array where each element has:
- "check": the check id (copy exactly from the check list)
- "confidence": a number between 0 and 1
- "file": the file path as given in the chunk header
- "line": the absolute line number of the vulnerable code
- "description": a short explanation of the vulnerability
- "suggested_fix": optional remediation advice

Output only a valid JSON array. No markdown fences, no extra text."#
        .to_string()
}

fn default_confidence() -> f64 {
    0.7
}

fn default_max_lines() -> usize {
    400
}

fn default_max_retries() -> u32 {
    3
}

fn default_api_timeout() -> u64 {
    120
}

fn default_concurrency() -> usize {
    4
}

fn default_rate_requests() -> u32 {
    30
}

fn default_rate_window() -> u64 {
    60
}

fn default_fp_command() -> String {
    "@diffsentry false-positive".to_string()
}

fn default_fp_storage() -> String {
    "file".to_string()
}

fn default_fp_expiration() -> u32 {
    90
}

impl Default for AiModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_rate_requests(),
            window: default_rate_window(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_concurrency(),
            request_timeout: None,
            run_timeout: 0,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for FalsePositiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_fp_command(),
            storage: default_fp_storage(),
            expiration: default_fp_expiration(),
            require_approval: true,
            track_history: true,
            include_reason: true,
        }
    }
}

impl Config {
    /// Load and validate configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints. Called by [`Config::from_file`];
    /// exposed separately for configs built in tests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security_checks.is_empty() {
            return Err(ConfigError::MissingKey("security_checks"));
        }
        if self.severity_levels.is_empty() {
            return Err(ConfigError::MissingKey("severity_levels"));
        }
        if !self.security_checks.values().any(|c| c.enabled) {
            return Err(ConfigError::Invalid {
                key: "security_checks".to_string(),
                reason: "at least one check must be enabled".to_string(),
            });
        }

        check_fraction("confidence_threshold", self.confidence_threshold)?;
        if self.max_lines == 0 {
            return Err(ConfigError::Invalid {
                key: "max_lines".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.api_timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "api_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        for (id, check) in &self.security_checks {
            if !self.severity_levels.contains_key(&check.severity) {
                return Err(ConfigError::Invalid {
                    key: format!("security_checks.{}.severity", id),
                    reason: format!("unknown severity level `{}`", check.severity),
                });
            }
            if check.description.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: format!("security_checks.{}.description", id),
                    reason: "must not be empty".to_string(),
                });
            }
            check_fraction(
                &format!("security_checks.{}.confidence_threshold", id),
                check.confidence_threshold,
            )?;
        }

        for (name, level) in &self.severity_levels {
            check_fraction(
                &format!("severity_levels.{}.threshold", name),
                level.threshold,
            )?;
        }

        if self.performance.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid {
                key: "performance.max_concurrent_requests".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.performance.rate_limit.requests == 0 || self.performance.rate_limit.window == 0 {
            return Err(ConfigError::Invalid {
                key: "performance.rate_limit".to_string(),
                reason: "requests and window must be greater than zero".to_string(),
            });
        }

        for pattern in &self.exclude_paths {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Invalid {
                    key: "exclude_paths".to_string(),
                    reason: format!("bad glob `{}`: {}", pattern, e),
                });
            }
        }

        if self.false_positives.enabled {
            let mut words = self.false_positives.command.split(' ');
            match words.next() {
                Some(bot) if bot.len() > 1 && bot.starts_with('@') => {}
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "false_positives.command".to_string(),
                        reason: "must start with an @bot-name token".to_string(),
                    })
                }
            }
            if words.next().is_none() {
                return Err(ConfigError::Invalid {
                    key: "false_positives.command".to_string(),
                    reason: "must contain a command word after the bot name".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Compiled exclude globs. Validation guarantees every pattern parses.
    pub fn exclude_patterns(&self) -> Vec<glob::Pattern> {
        self.exclude_paths
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect()
    }

    /// Effective per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.performance.request_timeout.unwrap_or(self.api_timeout))
    }

    /// Whole-run deadline, if configured.
    pub fn run_deadline(&self) -> Option<Duration> {
        match self.performance.run_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// The strictest of the global, check-level, and severity-level
    /// confidence floors for the given check.
    pub fn effective_threshold(&self, check_id: &str) -> f64 {
        let mut threshold = self.confidence_threshold;
        if let Some(check) = self.security_checks.get(check_id) {
            threshold = threshold.max(check.confidence_threshold);
            if let Some(level) = self.severity_levels.get(&check.severity) {
                threshold = threshold.max(level.threshold);
            }
        }
        threshold
    }

    /// Enabled checks in deterministic (id-sorted) order.
    pub fn enabled_checks(&self) -> impl Iterator<Item = (&String, &CheckDefinition)> {
        self.security_checks.iter().filter(|(_, c)| c.enabled)
    }

    /// Resolve a check from the display type shown in reports.
    pub fn check_by_description(&self, description: &str) -> Option<(&String, &CheckDefinition)> {
        self.security_checks
            .iter()
            .find(|(_, c)| c.description == description)
    }
}

fn check_fraction(key: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{} is outside [0, 1]", value),
        });
    }
    Ok(())
}
