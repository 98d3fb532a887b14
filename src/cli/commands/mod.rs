//! CLI command implementations
//!
//! Each subcommand has its own module with an Args struct and an async
//! `run()` taking the application context.

use std::str::FromStr;

use crate::app::AppContext;
use crate::cli::Commands;
use crate::error::Result;

pub mod related;
pub mod resolve;
pub mod search;
pub mod stats;

/// Dispatch one command, then persist snapshots.
///
/// # Errors
///
/// Propagates the command's error; snapshots are saved either way.
pub async fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    let outcome = match command {
        Commands::Search(args) => search::run(ctx, args).await,
        Commands::Resolve(args) => resolve::run(ctx, args).await,
        Commands::Stats(args) => stats::run(ctx, args),
        Commands::Related(args) => related::run(ctx, args).await,
    };
    ctx.persist();
    outcome
}

/// Parse a comma-separated list such as `skills,personas`.
pub(crate) fn parse_list<T>(raw: &str) -> Result<Vec<T>>
where
    T: FromStr<Err = crate::error::IndexError>,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
