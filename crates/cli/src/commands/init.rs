//! Write a starter .diffsentry.toml

use anyhow::{Context, Result};
use colored::Colorize;
use diffsentry_core::Config;
use std::path::Path;

const TEMPLATE: &str = r#"# diffsentry configuration

confidence_threshold = 0.7
max_lines = 400
max_retries = 3
api_timeout = 120
exclude_paths = ["*.lock", "vendor/*", "*.min.js"]

[ai_model]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
temperature = 0.1
max_tokens = 4096

[performance]
max_concurrent_requests = 4

[performance.rate_limit]
requests = 30
window = 60

[false_positives]
command = "@diffsentry false-positive"
expiration = 90
require_approval = true

[severity_levels.critical]
threshold = 0.9
color = "red"
description = "Exploitable vulnerabilities requiring immediate attention"

[severity_levels.high]
threshold = 0.8
color = "red"
description = "Serious issues that should block the change"

[severity_levels.medium]
threshold = 0.7
color = "yellow"
description = "Issues worth fixing before merge"

[severity_levels.low]
threshold = 0.5
color = "blue"
description = "Hardening opportunities"

[security_checks.sql_injection]
severity = "critical"
description = "SQL Injection"
owasp = "A03:2021"
cwe = "CWE-89"
patterns = ["string concatenation in queries", "unparameterized statements"]

[security_checks.command_injection]
severity = "critical"
description = "Command Injection"
owasp = "A03:2021"
cwe = "CWE-78"
patterns = ["shell invocation with user input"]

[security_checks.xss]
severity = "high"
description = "Cross-Site Scripting"
owasp = "A03:2021"
cwe = "CWE-79"
patterns = ["unescaped output in HTML context"]

[security_checks.hardcoded_secrets]
severity = "high"
description = "Hardcoded Secret"
owasp = "A07:2021"
cwe = "CWE-798"
patterns = ["API keys", "passwords", "tokens in source"]

[security_checks.path_traversal]
severity = "high"
description = "Path Traversal"
owasp = "A01:2021"
cwe = "CWE-22"
patterns = ["user input in file paths"]

[security_checks.weak_crypto]
severity = "medium"
description = "Weak Cryptography"
owasp = "A02:2021"
cwe = "CWE-327"
patterns = ["MD5", "SHA1", "ECB mode"]
"#;

pub fn run(path: Option<&Path>) -> Result<()> {
    let target_path = path.unwrap_or_else(|| Path::new("."));
    let config_path = target_path.join(".diffsentry.toml");

    if config_path.exists() {
        println!(
            "  {} .diffsentry.toml already exists at {}",
            "warn:".yellow(),
            config_path.display()
        );
        return Ok(());
    }

    // The shipped template must always pass its own validation
    let parsed: Config = toml::from_str(TEMPLATE).context("starter template is invalid")?;
    parsed.validate()?;

    std::fs::write(&config_path, TEMPLATE)
        .with_context(|| format!("write {}", config_path.display()))?;

    println!("  {} {}", "created".green(), config_path.display());
    println!("\n  Customize the checks, then run:");
    println!("    diffsentry review --base main");
    Ok(())
}
