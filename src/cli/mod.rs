// Command Line Interface Module
// Demo driver for the shutdown coordinator using clap

pub mod commands;

use clap::{Parser, Subcommand};
use colored::*;

/// graceful-drain - wait for in-flight work before exiting
#[derive(Parser)]
#[command(name = "graceful-drain")]
#[command(version)]
#[command(about = "Track in-flight work and drain it on SIGINT/SIGTERM", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Spawn demo workers and drain them when a shutdown signal arrives
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "drain.toml")]
        config: String,

        /// Number of workers holding a subscription
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Simulated cleanup time per worker, in milliseconds
        #[arg(long, default_value = "250")]
        work_ms: u64,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long, default_value = "drain.toml")]
        file: String,
    },

    /// Print the default configuration
    Defaults,
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}
