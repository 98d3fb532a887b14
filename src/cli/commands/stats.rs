//! eix stats - per-source cache diagnostics

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{emit_json, source_label, state_label};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Show per-type rows
    #[arg(long)]
    pub types: bool,
}

pub fn run(ctx: &AppContext, args: &StatsArgs) -> Result<()> {
    let stats = ctx.manager.stats();

    if ctx.machine {
        return emit_json(&stats, Vec::new());
    }

    let order = stats
        .priority
        .priority()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" > ");
    println!("{} {}", "priority:".bold(), order);
    println!(
        "{} {} verbs over {} elements",
        "triggers:".bold(),
        stats.trigger_verbs,
        stats.trigger_elements
    );

    for source in &stats.sources {
        let built = source
            .last_built
            .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
        let mut line = format!(
            "{:<12} {:<12} {:>5} entries  built {}",
            source_label(source.source),
            state_label(source.state),
            source.entry_count,
            built
        );
        if source.degraded {
            line.push_str(&format!("  {}", "degraded".red()));
        }
        if let Some(limit) = &source.rate_limit {
            if let Some(remaining) = limit.remaining {
                line.push_str(&format!("  rate limit remaining {remaining}"));
            }
        }
        println!("{line}");

        if args.types {
            for ty in &source.types {
                let mut row = format!(
                    "    {:<10} {:<12} {:>5}",
                    ty.element_type.to_string(),
                    state_label(ty.state),
                    ty.entry_count
                );
                if let Some(err) = &ty.last_error {
                    row.push_str(&format!("  {}", err.dimmed()));
                }
                println!("{row}");
            }
        }
    }
    Ok(())
}
