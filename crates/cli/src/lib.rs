//! Diffsentry CLI library — exposed for integration tests

pub mod ai;
pub mod commands;
pub mod output;
pub mod progress;
pub mod run_log;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "diffsentry")]
#[command(about = "AI-assisted security review for change sets", long_about = None)]
#[command(version = diffsentry_core::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the repository (default: current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Path to the configuration file (default: .diffsentry.toml in the repo)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Review the changes between two refs (default command)
    Review {
        /// Base ref to diff against
        #[arg(long, default_value = "main")]
        base: String,

        /// Head ref to review (default: working HEAD)
        #[arg(long)]
        head: Option<String>,

        /// Change-set identifier shown in the report (e.g. a PR number)
        #[arg(long)]
        change_set: Option<String>,

        /// Publish the report to GitHub instead of the terminal
        #[arg(long)]
        github: bool,
    },

    /// Manage false-positive marks
    Fp {
        #[command(subcommand)]
        action: commands::fp::FpAction,
    },

    /// Write a starter .diffsentry.toml
    Init {
        /// Path to initialize (default: current directory)
        path: Option<PathBuf>,
    },
}
