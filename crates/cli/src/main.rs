//! Diffsentry CLI - security review for change sets

use anyhow::Result;
use clap::Parser;
use diffsentry_cli::{commands, Cli, Commands};
use diffsentry_core::Conclusion;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Exit codes: 0 pass, 1 fail, 2 usage or pipeline error.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            eprintln!("\n  interrupted, finishing in-flight requests...");
            cancel.store(true, Ordering::SeqCst);
        });
    }

    let result: Result<Conclusion> = match cli.command {
        Some(Commands::Init { ref path }) => {
            commands::init::run(path.as_deref()).map(|_| Conclusion::Pass)
        }
        Some(Commands::Fp { ref action }) => {
            commands::fp::run(action, &cli).map(|_| Conclusion::Pass)
        }
        Some(Commands::Review {
            ref base,
            ref head,
            ref change_set,
            github,
        }) => commands::review::run(
            &cli,
            base,
            head.as_deref(),
            change_set.as_deref(),
            github,
            &cancel,
        ),
        None => {
            // Default command is a terminal review against main
            commands::review::run(&cli, "main", None, None, false, &cancel)
        }
    };

    match result {
        Ok(Conclusion::Pass) => ExitCode::SUCCESS,
        Ok(Conclusion::Fail) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
