//! False-positive mark management.
//!
//! The same `@bot false-positive CheckType (file:line) reason` grammar used
//! in review comments drives the `mark` subcommand, so CI bots and local
//! operators submit through one parser. Approve/reject take just the
//! `CheckType (file:line)` part.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use diffsentry_core::ledger::unix_now;
use diffsentry_core::{
    parse_command, resolve_command, Config, FileMarkStore, Finding, FindingKey, Ledger, STATE_DIR,
};
use std::path::Path;

use crate::commands::review::resolve_repo;
use crate::run_log;

#[derive(Subcommand)]
pub enum FpAction {
    /// List all marks, newest first
    List,

    /// Submit a mark from a full suppression comment
    Mark {
        /// The comment text, e.g. `@diffsentry false-positive SQL Injection (db.py:42) test data`
        comment: String,

        /// Who is requesting the mark
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Approve a pending mark
    Approve {
        /// Finding location, e.g. `SQL Injection (db.py:42)`
        location: String,

        /// Who is approving
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Reject a pending mark; the finding stays active
    Reject {
        /// Finding location, e.g. `SQL Injection (db.py:42)`
        location: String,

        /// Who is rejecting
        #[arg(long, default_value = "local")]
        user: String,
    },
}

pub fn run(action: &FpAction, cli: &crate::Cli) -> Result<()> {
    let repo_path = resolve_repo(cli);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| repo_path.join(".diffsentry.toml"));
    let config = Config::from_file(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    let store = FileMarkStore::new(&repo_path.join(STATE_DIR));
    let mut ledger = Ledger::open(store, config.false_positives.clone())?;

    match action {
        FpAction::List => list(&ledger),
        FpAction::Mark { comment, user } => {
            let cmd = parse_command(comment, &config.false_positives.command)?;
            let finding = resolve(&repo_path, &config, &cmd)?;
            let mark = ledger.submit(&finding.key, user, &cmd.reason, unix_now())?;
            println!(
                "  marked {} as false positive ({})",
                finding.key,
                mark.state.to_string().yellow()
            );
            Ok(())
        }
        FpAction::Approve { location, user } => {
            let key = locate(&repo_path, &config, location)?;
            let version = pending_version(&ledger, &key)?;
            // The local operator holds repo write access, i.e. maintainer
            ledger.approve(&key, user, true, version, unix_now())?;
            println!("  {} suppression for {}", "approved".green(), key);
            Ok(())
        }
        FpAction::Reject { location, user } => {
            let key = locate(&repo_path, &config, location)?;
            let version = pending_version(&ledger, &key)?;
            ledger.reject(&key, user, true, version, unix_now())?;
            println!("  {} suppression for {}", "rejected".red(), key);
            Ok(())
        }
    }
}

fn list(ledger: &Ledger<FileMarkStore>) -> Result<()> {
    if ledger.marks().is_empty() {
        println!("  no false-positive marks recorded");
        return Ok(());
    }
    let now = unix_now();
    for mark in ledger.marks().iter().rev() {
        let state = if mark.expired(now) {
            "expired".dimmed()
        } else {
            mark.state.to_string().normal()
        };
        println!("  [{}] {}", state, mark.key);
        println!(
            "      by {} — {}",
            mark.requested_by,
            if mark.reason.is_empty() {
                "(no reason)"
            } else {
                mark.reason.as_str()
            }
        );
        if let Some(decided_by) = &mark.decided_by {
            println!("      decided by {}", decided_by);
        }
    }
    Ok(())
}

/// Resolve a parsed command against the latest recorded run.
fn resolve(
    repo_path: &Path,
    config: &Config,
    cmd: &diffsentry_core::ParsedCommand,
) -> Result<Finding> {
    let log = run_log::latest_run(repo_path)?
        .context("no recorded review runs; run `diffsentry review` first")?;
    let finding = resolve_command(cmd, config, &log.run.findings)?;
    Ok(finding.clone())
}

/// Parse a bare `CheckType (file:line)` location by prefixing the configured
/// command, then resolve it.
fn locate(repo_path: &Path, config: &Config, location: &str) -> Result<FindingKey> {
    let synthetic = format!("{} {}", config.false_positives.command, location);
    let cmd = parse_command(&synthetic, &config.false_positives.command)?;
    Ok(resolve(repo_path, config, &cmd)?.key)
}

fn pending_version(ledger: &Ledger<FileMarkStore>, key: &FindingKey) -> Result<u64> {
    match ledger.latest_mark(key) {
        Some(mark) => Ok(mark.version),
        None => bail!("no mark recorded for {}", key),
    }
}
