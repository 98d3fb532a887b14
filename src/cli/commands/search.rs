//! eix search - free-text search across sources

use std::time::Duration;

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{emit_json, entry_line, source_label};
use crate::error::Result;
use crate::manager::SearchOptions;

use super::parse_list;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query; empty lists everything
    #[arg(default_value = "")]
    pub query: String,

    /// Element types (comma-separated: persona, skill, template, agent)
    #[arg(long, short)]
    pub types: Option<String>,

    /// Sources to consult (comma-separated: local, github, collection)
    #[arg(long, short)]
    pub sources: Option<String>,

    /// Consult every source even after one has hits
    #[arg(long, short = 'a')]
    pub all: bool,

    /// 1-based page number
    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Results per page
    #[arg(long, short = 'n')]
    pub page_size: Option<usize>,

    /// Call deadline in milliseconds; partial results on expiry
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

pub async fn run(ctx: &AppContext, args: &SearchArgs) -> Result<()> {
    let mut options = SearchOptions::new().include_all(args.all);
    options.page = args.page;
    options.page_size = args.page_size;
    if let Some(raw) = &args.types {
        options = options.types(parse_list(raw)?);
    }
    if let Some(raw) = &args.sources {
        options = options.sources(parse_list(raw)?);
    }
    if let Some(ms) = args.timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }

    let page = ctx.manager.search(&args.query, &options).await?;

    if ctx.machine {
        let warnings = page
            .skipped_sources
            .iter()
            .map(|s| format!("source {s} skipped"))
            .collect();
        return emit_json(&page, warnings);
    }

    if page.is_empty() {
        println!("{} No elements match '{}'", "!".yellow(), args.query);
    }
    for entry in &page.items {
        println!("{}", entry_line(entry));
    }
    if page.total > 0 {
        println!(
            "{}",
            format!(
                "page {} ({} of {} results)",
                page.page,
                page.items.len(),
                page.total
            )
            .dimmed()
        );
    }
    if page.partial {
        println!("{} Deadline expired; results may be incomplete", "!".yellow());
    }
    for source in &page.skipped_sources {
        println!("{} Skipped {}", "!".yellow(), source_label(*source));
    }
    Ok(())
}
