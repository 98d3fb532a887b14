//! eix resolve - find the authoritative copy of an element

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::{emit_json, entry_line, source_label};
use crate::core::{ElementType, SourceKind};
use crate::error::{IndexError, Result};
use crate::manager::ResolveOptions;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Element name
    pub name: String,

    /// Element type (persona, skill, template, agent)
    #[arg(long = "type", short = 't', default_value = "skill")]
    pub element_type: ElementType,

    /// Consult this source first
    #[arg(long, short)]
    pub prefer: Option<SourceKind>,

    /// Check every source for a newer version
    #[arg(long, short = 'u')]
    pub check_updates: bool,

    /// Collect candidates from every source
    #[arg(long, short = 'a')]
    pub all: bool,
}

pub async fn run(ctx: &AppContext, args: &ResolveArgs) -> Result<()> {
    let mut options = ResolveOptions::new().include_all(args.all);
    if args.check_updates {
        options = options.check_all_for_updates(true);
    }
    if let Some(source) = args.prefer {
        options = options.preferred_source(source);
    }

    let Some(resolved) = ctx.manager.resolve(&args.name, args.element_type, &options).await? else {
        return Err(IndexError::NotFound(format!("{}/{}", args.element_type, args.name)));
    };

    if ctx.machine {
        return emit_json(&resolved, Vec::new());
    }

    println!("{}", entry_line(&resolved.entry));
    for candidate in &resolved.entry.candidates {
        println!(
            "  {} v{} {}",
            source_label(candidate.source),
            candidate.version,
            candidate.source_ref.to_string().dimmed()
        );
    }
    if let (Some(source), Some(version)) = (resolved.update_source, &resolved.update_version) {
        println!(
            "{} Update available: v{} from {}",
            "↑".green(),
            version,
            source_label(source)
        );
    }
    Ok(())
}
