use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::executor::ExecutorPreference;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,             // global --quiet
    pub no_color: bool,          // global --no-color
    pub dry_run: bool,           // global --dry-run
    pub verbose: bool,           // global --verbose
    pub config: Option<PathBuf>, // global --config
}

#[derive(Parser)]
#[command(name = "jsdedup")]
#[command(about = "Parallel near-duplicate detection and clustering for decoded JavaScript files")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Analyze only; write nothing to the output directory
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Explicit config file (default: jsdedup.toml in the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            verbose: self.verbose,
            config: self.config.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect duplicates in a directory and partition it into an output tree
    Dedupe(DedupeArgs),

    /// Score one pair of files and show every similarity component
    Compare(CompareArgs),

    /// Print the extracted feature record of one file as JSON
    Inspect(InspectArgs),

    /// Initialize a jsdedup.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DedupeArgs {
    /// Directory of decoded files to analyze
    pub input: PathBuf,

    /// Directory that receives the partitioned copies and the report
    pub output: PathBuf,

    /// Similarity threshold in (0, 1] (overrides config)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Maximum worker count (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// File extension to include (overrides config)
    #[arg(short, long)]
    pub extension: Option<String>,

    /// Parallel executor strategy (overrides config)
    #[arg(long, value_enum)]
    pub executor: Option<ExecutorPreference>,

    /// Additional glob patterns to ignore
    #[arg(short, long)]
    pub ignore: Vec<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// First file
    pub first: PathBuf,

    /// Second file
    pub second: PathBuf,

    /// Threshold used for the duplicate verdict (overrides config)
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Print the score as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// File to inspect
    pub file: PathBuf,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
