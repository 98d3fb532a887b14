//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// eix - search and resolve elements across local, portfolio and collection sources
#[derive(Parser, Debug)]
#[command(name = "eix")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit JSON on stdout and JSON logs on stderr
    #[arg(long, short = 'm', global = true)]
    pub machine: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/eix/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not load or save persisted snapshots
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search elements across sources
    Search(commands::search::SearchArgs),

    /// Find the authoritative copy of an element
    Resolve(commands::resolve::ResolveArgs),

    /// Show per-source cache state
    Stats(commands::stats::StatsArgs),

    /// List elements related to one element
    Related(commands::related::RelatedArgs),
}
