use anyhow::Result;
use clap::Parser;
use jsdedup::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();

    jsdedup::infra::logging::init(ctx.verbose, ctx.quiet, ctx.no_color);

    match cli.command {
        Commands::Dedupe(args) => jsdedup::dedupe_run(args, &ctx),
        Commands::Compare(args) => jsdedup::compare_run(args, &ctx),
        Commands::Inspect(args) => jsdedup::inspect_run(args, &ctx),
        Commands::Init(args) => jsdedup::infra::config::init(args, &ctx),
        Commands::Completions(args) => jsdedup::completion::run(args, &ctx),
    }
}
