//! Converts validated raw findings into canonical, deduplicated findings.

use crate::config::Config;
use crate::finding::{content_checksum, CoverageGap, Finding, FindingKey, FindingStatus};
use crate::orchestrator::{ChunkOutcome, ChunkResult};
use std::collections::HashMap;

/// A raw finding that did not survive filtering, with the reason. Kept for
/// logging; never published.
#[derive(Debug, Clone)]
pub struct DroppedFinding {
    pub check: String,
    pub file: String,
    pub line: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct FilterOutcome {
    pub findings: Vec<Finding>,
    pub dropped: Vec<DroppedFinding>,
}

/// Apply threshold and enablement gates, then deduplicate by finding key.
///
/// Outcomes must be in chunk submission order: when two surviving raw
/// findings share a key (overlapping chunk windows), the higher confidence
/// wins and ties keep the first seen.
pub fn filter_outcomes(outcomes: &[ChunkOutcome], config: &Config) -> FilterOutcome {
    let mut findings: Vec<Finding> = Vec::new();
    let mut by_key: HashMap<FindingKey, usize> = HashMap::new();
    let mut dropped = Vec::new();

    for outcome in outcomes {
        let raws = match &outcome.result {
            ChunkResult::Findings(raws) => raws,
            ChunkResult::Incomplete { .. } => continue,
        };

        for raw in raws {
            // Validated upstream: the check id is known and the line is
            // inside the chunk.
            let check = &config.security_checks[&raw.check];
            let drop = |reason: String| DroppedFinding {
                check: raw.check.clone(),
                file: raw.file.clone(),
                line: raw.line,
                reason,
            };

            if !check.enabled {
                dropped.push(drop("check disabled".to_string()));
                continue;
            }
            let level_enabled = config
                .severity_levels
                .get(&check.severity)
                .map(|l| l.enabled)
                .unwrap_or(false);
            if !level_enabled {
                dropped.push(drop(format!("severity `{}` disabled", check.severity)));
                continue;
            }
            let threshold = config.effective_threshold(&raw.check);
            if raw.confidence < threshold {
                dropped.push(drop(format!(
                    "confidence {:.2} below effective threshold {:.2}",
                    raw.confidence, threshold
                )));
                continue;
            }

            let line_text = outcome.chunk.line_text(raw.line).unwrap_or("");
            let key = FindingKey {
                check_id: raw.check.clone(),
                file: raw.file.clone(),
                line: raw.line,
                checksum: content_checksum(line_text.trim()),
            };

            match by_key.get(&key) {
                Some(&idx) if findings[idx].confidence >= raw.confidence => {
                    // duplicate from an overlapping window; first seen wins ties
                }
                Some(&idx) => {
                    findings[idx].confidence = raw.confidence;
                    findings[idx].description = raw.description.clone();
                    findings[idx].suggested_fix = raw.suggested_fix.clone();
                }
                None => {
                    by_key.insert(key.clone(), findings.len());
                    findings.push(Finding {
                        key,
                        severity: check.severity.clone(),
                        confidence: raw.confidence,
                        check_type: check.description.clone(),
                        owasp: check.owasp.clone(),
                        cwe: check.cwe.clone(),
                        description: raw.description.clone(),
                        suggested_fix: raw.suggested_fix.clone(),
                        status: FindingStatus::Active,
                    });
                }
            }
        }
    }

    FilterOutcome { findings, dropped }
}

/// Extract the coverage gaps (chunks whose analysis never completed).
pub fn collect_gaps(outcomes: &[ChunkOutcome]) -> Vec<CoverageGap> {
    outcomes
        .iter()
        .filter_map(|o| match &o.result {
            ChunkResult::Incomplete { attempts, error } => Some(CoverageGap {
                file: o.chunk.file.clone(),
                start_line: o.chunk.start_line,
                end_line: o.chunk.end_line() - 1,
                attempts: *attempts,
                error: error.clone(),
            }),
            ChunkResult::Findings(_) => None,
        })
        .collect()
}
