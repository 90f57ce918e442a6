//! Main review command — wires the change-set reader, chunker, orchestrator,
//! filter, ledger, and publisher together.

use anyhow::{Context, Result};
use colored::Colorize;
use diffsentry_core::ledger::unix_now;
use diffsentry_core::{
    chunk_files, collect_gaps, filter_outcomes, ChangeSetReader, Conclusion, Config, FileMarkStore,
    Ledger, Orchestrator, ReportPublisher, STATE_DIR,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use crate::ai::HttpProvider;
use crate::output;
use crate::progress::Step;
use crate::run_log;

pub fn run(
    cli: &crate::Cli,
    base: &str,
    head: Option<&str>,
    change_set_id: Option<&str>,
    github: bool,
    cancel: &AtomicBool,
) -> Result<Conclusion> {
    let start = Instant::now();
    let repo_path = resolve_repo(cli);

    println!(
        "{}",
        format!(
            "  diffsentry v{} — reviewing {} against {}",
            diffsentry_core::VERSION,
            head.unwrap_or("HEAD"),
            base
        )
        .bold()
    );
    println!();

    // ── 1. Config ────────────────────────────────────────────────
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| repo_path.join(".diffsentry.toml"));
    let config = Config::from_file(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    // ── 2. Change set ────────────────────────────────────────────
    let step = Step::new("Reading change set");
    let reader = ChangeSetReader::open(&repo_path)?;
    let mut change_set = reader.read(base, head, &config.exclude_patterns())?;
    if let Some(id) = change_set_id {
        change_set.id = id.to_string();
    }
    if change_set.files.is_empty() {
        step.skip("No reviewable changes.");
        return Ok(Conclusion::Pass);
    }
    step.finish(&format!("{} changed file(s)", change_set.files.len()));

    let publisher = ReportPublisher::new(&config);

    // ── 3. Chunk and analyze ─────────────────────────────────────
    let chunks = chunk_files(&change_set.files, config.max_lines);
    let step = Step::new(format!("Analyzing {} chunk(s)", chunks.len()));
    let provider = HttpProvider::new(&config.ai_model)?;
    let orchestrator = Orchestrator::new(&config, &provider, cancel);
    let outcomes = orchestrator.run(chunks)?;
    for warning in outcomes.iter().flat_map(|o| &o.warnings) {
        step.warn(warning);
    }
    step.finish(&format!("{} chunk(s) analyzed", outcomes.len()));

    // ── 4. Filter ────────────────────────────────────────────────
    let filtered = filter_outcomes(&outcomes, &config);
    let gaps = collect_gaps(&outcomes);
    if !filtered.dropped.is_empty() {
        eprintln!(
            "  {} raw finding(s) dropped below thresholds",
            filtered.dropped.len()
        );
    }

    // ── 5. Ledger ────────────────────────────────────────────────
    let mut findings = filtered.findings;
    let store = FileMarkStore::new(&repo_path.join(STATE_DIR));
    let ledger = Ledger::open(store, config.false_positives.clone())?;
    ledger.apply(&mut findings, unix_now());

    // ── 6. Record, then publish ──────────────────────────────────
    let run = publisher.build_run(change_set.id, change_set.commit, findings, gaps);

    let run_id = run_log::new_run_id();
    let log_path = run_log::save_run(&repo_path, &run_id, &run)?;

    if github {
        let ctx = output::github::GitHubContext::from_env().context(
            "missing GitHub environment (GITHUB_TOKEN, GITHUB_REPOSITORY, \
             GITHUB_PR_NUMBER, GITHUB_SHA)",
        )?;
        let step = Step::new("Publishing report");
        let mut sink = output::github::GitHubSink::new(ctx)?;
        if let Err(e) = publisher.publish(&run, &mut sink) {
            step.warn(&e);
            eprintln!(
                "  run preserved at {}; fix the surface and re-publish",
                log_path.display()
            );
            return Err(e.into());
        }
        step.finish(&format!("{} finding(s) published", run.findings.len()));
    } else {
        output::terminal::print_run(&run, &config);
    }

    println!("  Time: {:.1}s", start.elapsed().as_secs_f64());
    Ok(run.conclusion)
}

pub fn resolve_repo(cli: &crate::Cli) -> PathBuf {
    let path = cli.repo.as_deref().unwrap_or_else(|| Path::new("."));
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
