//! CLI interface for Taskpilot
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the orchestration
//! engine from a terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Taskpilot plan-based orchestration engine
///
/// Turns one natural-language request into an ordered plan of provider
/// operations, executes it and prints a single aggregated report.
#[derive(Parser, Debug)]
#[command(name = "taskpilot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process a request end to end
    Run {
        /// The request, in natural language
        utterance: String,

        /// Workspace the request applies to
        #[arg(long, short)]
        workspace: i64,

        /// Requesting user, if known
        #[arg(long, short)]
        user: Option<i64>,
    },

    /// Analyze a request and print the plan without executing it
    Plan {
        /// The request, in natural language
        utterance: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Store the NLU API key in the OS keychain (read from stdin)
    SetKey,
}
