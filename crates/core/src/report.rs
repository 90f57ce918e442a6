//! Renders and idempotently publishes the vetted finding set.
//!
//! Publication is staged: the whole report is rendered and the conclusion
//! computed before the sink sees anything, so a mid-computation failure never
//! leaves a half-written report behind.

use crate::config::Config;
use crate::error::PublishError;
use crate::finding::{Conclusion, CoverageGap, Finding, FindingStatus, ReviewRun};
use std::time::Duration;

/// Attempts per publish, including the first.
const PUBLISH_ATTEMPTS: u32 = 3;

/// A fully rendered finding ready for the sink. The marker is a stable hash
/// of the finding key; sinks use it to update an already-published finding
/// in place instead of duplicating it.
#[derive(Debug, Clone)]
pub struct RenderedFinding {
    pub marker: String,
    pub file: String,
    pub line: usize,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub conclusion: Conclusion,
    pub summary: String,
    pub findings: Vec<RenderedFinding>,
}

/// Outbound seam to the host platform's check/comment surface.
pub trait ReportSink {
    /// Create or update a published finding, keyed by its marker.
    fn upsert_finding(&mut self, finding: &RenderedFinding) -> Result<(), PublishError>;

    /// Publish the grouped summary and overall conclusion.
    fn publish_summary(&mut self, summary: &str, conclusion: Conclusion)
        -> Result<(), PublishError>;
}

pub struct ReportPublisher<'a> {
    config: &'a Config,
}

impl<'a> ReportPublisher<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Fail iff any enabled severity level has at least one finding that
    /// still counts (Active or Expired); Suppressed findings never fail a
    /// run.
    pub fn conclude(&self, findings: &[Finding]) -> Conclusion {
        let failing = findings.iter().any(|f| {
            f.status.counts_for_conclusion()
                && self
                    .config
                    .severity_levels
                    .get(&f.severity)
                    .map(|l| l.enabled)
                    .unwrap_or(false)
        });
        if failing {
            Conclusion::Fail
        } else {
            Conclusion::Pass
        }
    }

    /// Assemble the immutable run record.
    pub fn build_run(
        &self,
        change_set: String,
        commit: String,
        findings: Vec<Finding>,
        coverage_gaps: Vec<CoverageGap>,
    ) -> ReviewRun {
        let conclusion = self.conclude(&findings);
        ReviewRun {
            change_set,
            commit,
            findings,
            coverage_gaps,
            conclusion,
        }
    }

    /// Render the complete report. No I/O happens here.
    pub fn render(&self, run: &ReviewRun) -> RenderedReport {
        RenderedReport {
            conclusion: run.conclusion,
            summary: self.render_summary(run),
            findings: run.findings.iter().map(|f| self.render_finding(f)).collect(),
        }
    }

    /// Publish the rendered report through the sink, retrying transient
    /// failures a bounded number of times. The computed run is never lost on
    /// failure; callers persist it to the run log before publishing.
    pub fn publish(&self, run: &ReviewRun, sink: &mut dyn ReportSink) -> Result<(), PublishError> {
        let rendered = self.render(run);

        let mut last = String::new();
        for attempt in 1..=PUBLISH_ATTEMPTS {
            match Self::emit(&rendered, sink) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last = e.to_string();
                    if attempt < PUBLISH_ATTEMPTS {
                        std::thread::sleep(Duration::from_millis(250 * u64::from(attempt)));
                    }
                }
            }
        }
        Err(PublishError::RetriesExhausted {
            attempts: PUBLISH_ATTEMPTS,
            last,
        })
    }

    fn emit(rendered: &RenderedReport, sink: &mut dyn ReportSink) -> Result<(), PublishError> {
        for finding in &rendered.findings {
            sink.upsert_finding(finding)?;
        }
        sink.publish_summary(&rendered.summary, rendered.conclusion)
    }

    /// Severity groups ordered strictest-first (by threshold, then name).
    fn severity_order(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.config.severity_levels.keys().collect();
        names.sort_by(|a, b| {
            let ta = self.config.severity_levels[*a].threshold;
            let tb = self.config.severity_levels[*b].threshold;
            tb.partial_cmp(&ta).unwrap().then_with(|| a.cmp(b))
        });
        names
    }

    fn render_summary(&self, run: &ReviewRun) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "## Security review: {}\n\n",
            match run.conclusion {
                Conclusion::Pass => "pass ✅",
                Conclusion::Fail => "fail ❌",
            }
        ));
        out.push_str(&format!(
            "Change set `{}` at `{}` — {} finding(s), {} suppressed, {} coverage gap(s)\n",
            run.change_set,
            short_commit(&run.commit),
            run.active_count(),
            run.suppressed_count(),
            run.coverage_gaps.len()
        ));

        for severity in self.severity_order() {
            let group: Vec<&Finding> = run
                .findings
                .iter()
                .filter(|f| &f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            out.push_str(&format!("\n### {}\n\n", severity));
            for f in group {
                let status = match f.status {
                    FindingStatus::Active => "",
                    FindingStatus::Suppressed => " — suppressed (false positive)",
                    FindingStatus::Expired => " — suppression expired",
                };
                out.push_str(&format!(
                    "- **{}** at `{}:{}` (confidence {:.2}){}\n",
                    f.check_type, f.key.file, f.key.line, f.confidence, status
                ));
            }
        }

        if !run.coverage_gaps.is_empty() {
            out.push_str("\n### Coverage gaps\n\n");
            out.push_str("These ranges could not be analyzed and are not covered by this review:\n");
            for gap in &run.coverage_gaps {
                out.push_str(&format!(
                    "- `{}:{}-{}` after {} attempt(s): {}\n",
                    gap.file, gap.start_line, gap.end_line, gap.attempts, gap.error
                ));
            }
        }

        out
    }

    fn render_finding(&self, finding: &Finding) -> RenderedFinding {
        let mut body = format!(
            "**{}** ({}, confidence {:.2})\n\n{}\n",
            finding.check_type, finding.severity, finding.confidence, finding.description
        );
        if !finding.owasp.is_empty() || !finding.cwe.is_empty() {
            let refs: Vec<&str> = [finding.owasp.as_str(), finding.cwe.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect();
            body.push_str(&format!("\nReferences: {}\n", refs.join(", ")));
        }
        if let Some(fix) = &finding.suggested_fix {
            body.push_str(&format!("\n> **Suggested fix:** {}\n", fix));
        }
        if finding.status == FindingStatus::Suppressed {
            body.push_str("\n_Suppressed as a false positive._\n");
        }

        // Invisible marker for idempotent updates on re-runs
        body.push_str(&format!("\n<!-- diffsentry:{} -->", finding.key.marker()));

        RenderedFinding {
            marker: finding.key.marker(),
            file: finding.key.file.clone(),
            line: finding.key.line,
            body,
        }
    }
}

/// Extract a diffsentry marker from a previously published body, if present.
pub fn extract_marker(body: &str) -> Option<String> {
    const PREFIX: &str = "<!-- diffsentry:";
    let start = body.find(PREFIX)? + PREFIX.len();
    let rest = &body[start..];
    let end = rest.find(" -->")?;
    Some(rest[..end].to_string())
}

fn short_commit(commit: &str) -> &str {
    &commit[..commit.len().min(12)]
}
