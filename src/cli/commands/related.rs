//! eix related - elements sharing vocabulary with one element

use clap::Args;
use colored::Colorize;

use crate::app::AppContext;
use crate::cli::output::emit_json;
use crate::core::ElementType;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct RelatedArgs {
    /// Element name
    pub name: String,

    /// Element type (persona, skill, template, agent)
    #[arg(long = "type", short = 't', default_value = "skill")]
    pub element_type: ElementType,

    /// Maximum neighbors to show
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,
}

pub async fn run(ctx: &AppContext, args: &RelatedArgs) -> Result<()> {
    let mut related = ctx.manager.related(&args.name, args.element_type).await?;
    related.truncate(args.limit);

    if ctx.machine {
        return emit_json(&related, Vec::new());
    }

    if related.is_empty() {
        println!("{} Nothing related to {}/{}", "!".yellow(), args.element_type, args.name);
        return Ok(());
    }
    for neighbor in &related {
        println!(
            "{:.3}  {}",
            neighbor.similarity,
            neighbor.key.to_string().bold()
        );
    }
    Ok(())
}
