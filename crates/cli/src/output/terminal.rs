//! Terminal output formatting

use colored::{ColoredString, Colorize};
use diffsentry_core::{Config, Conclusion, FindingStatus, ReviewRun};

/// Apply a severity level's configured color name to a string.
pub fn paint(config: &Config, severity: &str, text: &str) -> ColoredString {
    let color = config
        .severity_levels
        .get(severity)
        .map(|l| l.color.as_str())
        .unwrap_or("white");
    match color {
        "red" => text.red(),
        "yellow" => text.yellow(),
        "blue" => text.blue(),
        "green" => text.green(),
        "magenta" => text.magenta(),
        "cyan" => text.cyan(),
        _ => text.normal(),
    }
}

/// Print the full review to the terminal.
pub fn print_run(run: &ReviewRun, config: &Config) {
    println!();

    for f in &run.findings {
        let status = match f.status {
            FindingStatus::Active => "".normal(),
            FindingStatus::Suppressed => " [suppressed]".dimmed(),
            FindingStatus::Expired => " [suppression expired]".yellow(),
        };
        println!(
            "  {} {} {}:{} (confidence {:.2}){}",
            paint(config, &f.severity, &format!("[{}]", f.severity)),
            f.check_type.bold(),
            f.key.file,
            f.key.line,
            f.confidence,
            status
        );
        println!("      {}", f.description);
        if let Some(fix) = &f.suggested_fix {
            println!("      {} {}", "fix:".green(), fix);
        }
    }

    if !run.coverage_gaps.is_empty() {
        println!();
        println!("  {}", "Coverage gaps (not analyzed):".yellow());
        for gap in &run.coverage_gaps {
            println!(
                "    {}:{}-{} after {} attempt(s): {}",
                gap.file, gap.start_line, gap.end_line, gap.attempts, gap.error
            );
        }
    }

    println!();
    println!("  {}", "\u{2500}".repeat(60).dimmed());
    println!(
        "  {} finding(s) \u{00b7} {} suppressed \u{00b7} {} gap(s)",
        run.active_count(),
        run.suppressed_count(),
        run.coverage_gaps.len()
    );
    let verdict = match run.conclusion {
        Conclusion::Pass => "pass".green().bold(),
        Conclusion::Fail => "fail".red().bold(),
    };
    println!(
        "  Review of `{}` at {}: {}",
        run.change_set,
        &run.commit[..run.commit.len().min(12)],
        verdict
    );
}
