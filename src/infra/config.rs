use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::executor::ExecutorPreference;
use crate::error::DedupError;

/// Config files searched in the working directory, first match wins
const CONFIG_FILES: [&str; 4] = ["jsdedup.toml", ".jsdedup.toml", "jsdedup.yaml", "jsdedup.json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Ignore globs applied while discovering input files
    pub ignore_patterns: Vec<String>,

    /// Engine settings
    pub dedupe: DedupeConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupeConfig
{
    /// Duplicate classification cutoff, in (0, 1]
    pub similarity_threshold: f64,

    /// Worker pool cap; None means min(available parallelism, 8)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// Extension of files to analyze
    pub extension: String,

    /// Executor selection strategy
    pub executor: ExecutorPreference,

    /// Honour .gitignore files inside the input tree
    pub respect_ignore_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig
{
    /// Report file name, written inside the output directory
    pub report_file: String,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            ignore_patterns: vec!["node_modules/**".to_string(), ".git/**".to_string()],
            dedupe: DedupeConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for DedupeConfig
{
    fn default() -> Self
    {
        Self {
            similarity_threshold: 0.8,
            max_workers: None,
            extension: "js".to_string(),
            executor: ExecutorPreference::Auto,
            respect_ignore_files: false,
        }
    }
}

impl Default for OutputConfig
{
    fn default() -> Self
    {
        Self { report_file: "detailed_similarity_report.json".to_string() }
    }
}

impl Config
{
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), DedupError>
    {
        let t = self
            .dedupe
            .similarity_threshold;
        if !(t > 0.0 && t <= 1.0)
        {
            return Err(DedupError::Config(format!(
                "similarity_threshold must be in (0, 1], got {t}"
            )));
        }

        if self
            .dedupe
            .max_workers
            == Some(0)
        {
            return Err(DedupError::Config("max_workers must be at least 1".to_string()));
        }

        if self
            .output
            .report_file
            .trim()
            .is_empty()
        {
            return Err(DedupError::Config("report_file must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Load configuration: explicit file, else the first config file found in
/// the working directory, then `JSDEDUP_` environment overrides
/// (e.g. `JSDEDUP_DEDUPE__SIMILARITY_THRESHOLD=0.9`).
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None =>
        {
            for path in &CONFIG_FILES
            {
                if Path::new(path).exists()
                {
                    builder = builder.add_source(config::File::with_name(path));
                    break;
                }
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JSDEDUP")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    parsed.validate()?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path: PathBuf = args
        .path
        .join("jsdedup.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
