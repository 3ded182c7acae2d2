//! Filepath: src/core/engine.rs
//! Pipeline coordinator.
//!
//! Stages run strictly in order:
//!   1) enumerate input files
//!   2) parallel feature extraction
//!   3) exact-digest grouping
//!   4) one candidate per digest
//!   5) parallel pairwise scoring over all candidate pairs
//!   6) union-find clustering
//!   7) partition, copy, report
//!
//! Workers only read shared records and return values. The digest index
//! and the union-find forest are built here, on the coordinating thread,
//! after each phase's fan-in. No locks guard them because nothing else
//! can reach them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cli::{AppContext, DedupeArgs};
use crate::core::cluster::{Cluster, ClusterBuilder};
use crate::core::exact::{ExactDuplicateGroup, ExactDuplicateIndex};
use crate::core::executor::{Executor, ExecutorPreference, ParallelExecutor};
use crate::core::features::{FeatureExtractor, FeatureRecord};
use crate::core::partition::{OutputPartitioner, Partition};
use crate::core::report::{Report, RunSummary};
use crate::core::similarity::{Scored, SimilarityScore, SimilarityScorer};
use crate::error::{DedupError, Result};
use crate::infra::config::{Config, load_config};
use crate::infra::io::read_document;
use crate::infra::walk::FileWalker;

/// Engine settings resolved from config and CLI overrides
#[derive(Debug, Clone)]
pub struct EngineConfig
{
    pub similarity_threshold: f64,
    pub max_workers: Option<usize>,
    pub executor: ExecutorPreference,
    pub extension: String,
    pub ignore_patterns: Vec<String>,
    pub respect_ignore_files: bool,
    pub report_file: String,
    pub show_progress: bool,
}

impl Default for EngineConfig
{
    fn default() -> Self
    {
        Self::from_config(&Config::default())
    }
}

impl EngineConfig
{
    pub fn from_config(cfg: &Config) -> Self
    {
        Self {
            similarity_threshold: cfg
                .dedupe
                .similarity_threshold,
            max_workers: cfg
                .dedupe
                .max_workers,
            executor: cfg
                .dedupe
                .executor,
            extension: cfg
                .dedupe
                .extension
                .clone(),
            ignore_patterns: cfg
                .ignore_patterns
                .clone(),
            respect_ignore_files: cfg
                .dedupe
                .respect_ignore_files,
            report_file: cfg
                .output
                .report_file
                .clone(),
            show_progress: false,
        }
    }
}

/// Cooperative cancellation flag, checked between stages and before
/// every task
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn cancel(&self)
    {
        self.0
            .store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool
    {
        self.0
            .load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()>
    {
        if self.is_cancelled() { Err(DedupError::Cancelled) } else { Ok(()) }
    }
}

/// A document that survived extraction
#[derive(Debug, Clone)]
pub struct ExtractedDocument
{
    pub path: PathBuf,
    pub relative: PathBuf,
    pub features: FeatureRecord,
}

/// A discovered file excluded from comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile
{
    pub path: PathBuf,
    pub reason: String,
}

/// Everything detected for one corpus, before any output is written
#[derive(Debug)]
pub struct Analysis
{
    pub input_root: PathBuf,
    pub discovered: usize,
    /// Sorted by relative path
    pub documents: Vec<ExtractedDocument>,
    pub skipped: Vec<SkippedFile>,
    pub exact_groups: Vec<ExactDuplicateGroup>,
    /// Indices into `documents`, one per digest, ascending
    pub candidates: Vec<usize>,
    /// Duplicate-classified scores, in pair order
    pub duplicate_scores: Vec<SimilarityScore>,
    pub clusters: Vec<Cluster>,
    pub pairs_compared: usize,
    pub pairs_scored: usize,
    pub scoring_failures: usize,
    pub elapsed: Duration,
}

enum ExtractOutcome
{
    Extracted(ExtractedDocument),
    Skipped(SkippedFile),
    Cancelled,
}

/// What one scoring row (a candidate against every later candidate) hands
/// back. Discarded pairs leave nothing behind but a count.
#[derive(Debug, Default)]
struct RowTally
{
    duplicates: Vec<SimilarityScore>,
    reported: usize,
    failures: Vec<DedupError>,
    cancelled: bool,
}

/// Aggregate of all rows after fan-in
#[derive(Debug, Default)]
struct ScoreTotals
{
    duplicate_scores: Vec<SimilarityScore>,
    pairs_scored: usize,
    scoring_failures: usize,
}

/// Fold row tallies into the forest, in row order. Per-pair failures are
/// counted; anything fatal aborts.
fn merge_rows<I>(
    builder: &mut ClusterBuilder,
    rows: I,
) -> Result<ScoreTotals>
where
    I: IntoIterator<Item = RowTally>,
{
    let mut totals = ScoreTotals::default();
    for row in rows
    {
        if row.cancelled
        {
            return Err(DedupError::Cancelled);
        }
        for e in row.failures
        {
            if e.is_fatal()
            {
                return Err(e);
            }
            warn!("{e}");
            totals.scoring_failures += 1;
        }
        totals.pairs_scored += row.reported;
        for score in row.duplicates
        {
            builder.add(&score);
            totals
                .duplicate_scores
                .push(score);
        }
    }
    Ok(totals)
}

pub struct DedupEngine
{
    config: EngineConfig,
    extractor: FeatureExtractor,
    scorer: SimilarityScorer,
    executor: Executor,
    cancel: CancellationToken,
}

impl DedupEngine
{
    pub fn new(config: EngineConfig) -> Result<Self>
    {
        let scorer = SimilarityScorer::new(config.similarity_threshold)?;
        let extractor = FeatureExtractor::new()?;
        let executor = Executor::probe(config.executor, config.max_workers)?;
        info!(
            executor = executor.name(),
            workers = executor.workers(),
            threshold = config.similarity_threshold,
            "engine ready"
        );
        Ok(Self { config, extractor, scorer, executor, cancel: CancellationToken::new() })
    }

    /// Token that aborts this engine's runs when cancelled
    pub fn cancellation_token(&self) -> CancellationToken
    {
        self.cancel
            .clone()
    }

    pub fn executor(&self) -> &Executor
    {
        &self.executor
    }

    /// Stages 1 to 6
    pub fn analyze(
        &self,
        input: &Path,
    ) -> Result<Analysis>
    {
        self.analyze_excluding(input, None)
    }

    /// Stages 1 to 7: analyze `input`, then populate `output`
    pub fn run(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<RunSummary>
    {
        let started = Instant::now();

        // Fail on a bad input before touching the output location
        resolve_input(input)?;
        std::fs::create_dir_all(output)
            .map_err(|e| DedupError::io(format!("creating {}", output.display()), e))?;
        let output = output
            .canonicalize()
            .map_err(|e| DedupError::io(format!("resolving {}", output.display()), e))?;

        let analysis = self.analyze_excluding(input, Some(&output))?;
        self.cancel
            .check()?;

        let partition = Partition::plan(&analysis);
        let partitioner = OutputPartitioner::new(&output);
        let mut write_failures = partitioner.write(&analysis, &partition);

        let summary = RunSummary::build(
            &analysis,
            &partition,
            write_failures.len(),
            &self.executor,
            started.elapsed(),
        );

        let report_path = output.join(&self.config.report_file);
        let report = Report::build(&analysis, &partition, summary.clone(), write_failures.clone());
        if let Err(failure) = report.write_to(&report_path)
        {
            warn!("{}", failure.reason);
            write_failures.push(failure);
        }

        let summary = RunSummary { write_failures: write_failures.len(), ..summary };
        info!(
            total_files = summary.total_files,
            exact_groups = summary.exact_duplicate_groups,
            absorbed_exact_groups = summary.absorbed_exact_groups,
            similar_groups = summary.similar_groups,
            unique = summary.unique_files,
            seconds = summary.processing_time_seconds,
            files_per_second = summary.files_per_second,
            "run complete"
        );
        Ok(summary)
    }

    #[instrument(level = "debug", skip_all, fields(input = %input.display()))]
    fn analyze_excluding(
        &self,
        input: &Path,
        exclude: Option<&Path>,
    ) -> Result<Analysis>
    {
        let started = Instant::now();
        self.cancel
            .check()?;

        let root = resolve_input(input)?;

        // Stage 1: enumerate
        let mut walker = FileWalker::new(&self.config.ignore_patterns)?
            .with_extension(&self.config.extension)
            .with_respect_ignore_files(self.config.respect_ignore_files);
        if let Some(dir) = exclude
        {
            walker = walker.with_excluded_root(dir);
        }
        let files = walker.walk_files(&root);
        info!(files = files.len(), root = %root.display(), "discovered input files");
        self.cancel
            .check()?;

        // Stage 2: extraction fan-out, then fan-in on this thread
        let (mut documents, mut skipped) = self.extract_all(&root, &files)?;
        documents.sort_by(|a, b| {
            a.relative
                .cmp(&b.relative)
        });
        skipped.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
        });
        self.cancel
            .check()?;

        // Stages 3 and 4: digest buckets and candidates
        let index = ExactDuplicateIndex::build(
            documents
                .iter()
                .map(|d| &d.features.digest),
        );
        let exact_groups = index.groups(|i| {
            documents[i]
                .relative
                .clone()
        });
        let candidates = index.candidates();
        info!(
            digests = index.bucket_count(),
            exact_groups = exact_groups.len(),
            "exact-duplicate grouping done"
        );

        // Stage 5: scoring fan-out, one row per candidate
        let pairs_compared = candidates.len() * candidates.len().saturating_sub(1) / 2;
        let rows = self.score_all(&documents, &candidates, pairs_compared)?;

        // Stage 6: single-owner merge into the forest
        let mut builder = ClusterBuilder::new(
            candidates
                .iter()
                .map(|&i| {
                    (
                        documents[i]
                            .relative
                            .clone(),
                        documents[i]
                            .features
                            .size,
                    )
                })
                .collect(),
        );
        let ScoreTotals { duplicate_scores, pairs_scored, scoring_failures } =
            merge_rows(&mut builder, rows)?;
        let clusters = builder.finish();
        info!(
            pairs = pairs_compared,
            reported = pairs_scored,
            duplicates = duplicate_scores.len(),
            clusters = clusters.len(),
            "near-duplicate clustering done"
        );

        Ok(Analysis {
            input_root: root,
            discovered: files.len(),
            documents,
            skipped,
            exact_groups,
            candidates,
            duplicate_scores,
            clusters,
            pairs_compared,
            pairs_scored,
            scoring_failures,
            elapsed: started.elapsed(),
        })
    }

    fn extract_all(
        &self,
        root: &Path,
        files: &[PathBuf],
    ) -> Result<(Vec<ExtractedDocument>, Vec<SkippedFile>)>
    {
        let started = Instant::now();
        let progress = progress_bar(files.len(), "extract", self.config.show_progress);

        let outcomes = self
            .executor
            .execute(files, |path| {
                if self.cancel.is_cancelled()
                {
                    return ExtractOutcome::Cancelled;
                }
                let outcome = self.extract_one(root, path);
                progress.inc(1);
                outcome
            });
        progress.finish_and_clear();

        let mut documents = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for outcome in outcomes
        {
            match outcome
            {
                ExtractOutcome::Extracted(doc) => documents.push(doc),
                ExtractOutcome::Skipped(skip) => skipped.push(skip),
                ExtractOutcome::Cancelled => return Err(DedupError::Cancelled),
            }
        }

        log_throughput("extraction", files.len(), "files", started.elapsed());
        if !skipped.is_empty()
        {
            warn!(skipped = skipped.len(), "some files were excluded from comparison");
        }
        Ok((documents, skipped))
    }

    fn extract_one(
        &self,
        root: &Path,
        path: &Path,
    ) -> ExtractOutcome
    {
        let attempt = catch_unwind(AssertUnwindSafe(|| -> Result<Option<ExtractedDocument>> {
            let doc = read_document(path, root)?;
            match self
                .extractor
                .extract(&doc)
            {
                Some(features) =>
                {
                    Ok(Some(ExtractedDocument { path: doc.path, relative: doc.relative, features }))
                }
                None => Ok(None),
            }
        }));

        let result = attempt.unwrap_or_else(|payload| {
            Err(DedupError::Extraction {
                path: path.to_path_buf(),
                reason: panic_message(&*payload),
            })
        });

        match result
        {
            Ok(Some(doc)) =>
            {
                debug!(file = %doc.relative.display(), digest = %doc.features.digest, "extracted");
                ExtractOutcome::Extracted(doc)
            }
            Ok(None) =>
            {
                warn!(file = %path.display(), "empty content; skipped");
                ExtractOutcome::Skipped(SkippedFile {
                    path: relative_to(path, root),
                    reason: "empty content".to_string(),
                })
            }
            Err(e) =>
            {
                warn!("{e}");
                let reason = match e
                {
                    DedupError::FileRead { reason, .. } | DedupError::Extraction { reason, .. } =>
                    {
                        reason
                    }
                    other => other.to_string(),
                };
                ExtractOutcome::Skipped(SkippedFile { path: relative_to(path, root), reason })
            }
        }
    }

    fn score_all(
        &self,
        documents: &[ExtractedDocument],
        candidates: &[usize],
        pair_count: usize,
    ) -> Result<Vec<RowTally>>
    {
        let started = Instant::now();
        let progress = progress_bar(pair_count, "compare", self.config.show_progress);
        let rows: Vec<usize> = (0..candidates.len()).collect();

        let tallies = self
            .executor
            .execute(&rows, |&row| {
                let mut tally = RowTally::default();
                let a = &documents[candidates[row]];
                let later = &candidates[row + 1..];
                for &j in later
                {
                    if self.cancel.is_cancelled()
                    {
                        tally.cancelled = true;
                        break;
                    }
                    let b = &documents[j];
                    let attempt = catch_unwind(AssertUnwindSafe(|| {
                        self.scorer.score(
                            Scored { path: &a.relative, features: &a.features },
                            Scored { path: &b.relative, features: &b.features },
                        )
                    }));
                    match attempt
                    {
                        Ok(Ok(Some(score))) =>
                        {
                            tally.reported += 1;
                            if score.is_duplicate
                            {
                                tally
                                    .duplicates
                                    .push(score);
                            }
                        }
                        Ok(Ok(None)) =>
                        {}
                        Ok(Err(e)) => tally
                            .failures
                            .push(e),
                        Err(payload) => tally
                            .failures
                            .push(DedupError::Scoring {
                                file1: a.relative.clone(),
                                file2: b.relative.clone(),
                                reason: panic_message(&*payload),
                            }),
                    }
                }
                progress.inc(later.len() as u64);
                tally
            });
        progress.finish_and_clear();
        self.cancel
            .check()?;

        log_throughput("scoring", pair_count, "pairs", started.elapsed());
        Ok(tallies)
    }
}

/// Input must exist and be a directory; anything else is fatal
fn resolve_input(input: &Path) -> Result<PathBuf>
{
    let meta = std::fs::metadata(input).map_err(|e| DedupError::Input {
        path: input.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !meta.is_dir()
    {
        return Err(DedupError::Input {
            path: input.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    input
        .canonicalize()
        .map_err(|e| DedupError::Input { path: input.to_path_buf(), reason: e.to_string() })
}

fn relative_to(
    path: &Path,
    root: &Path,
) -> PathBuf
{
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_path_buf()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String
{
    if let Some(s) = payload.downcast_ref::<&str>()
    {
        format!("panicked: {s}")
    }
    else if let Some(s) = payload.downcast_ref::<String>()
    {
        format!("panicked: {s}")
    }
    else
    {
        "panicked".to_string()
    }
}

fn progress_bar(
    len: usize,
    label: &'static str,
    visible: bool,
) -> ProgressBar
{
    if !visible
    {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(label);
    pb
}

fn log_throughput(
    phase: &str,
    items: usize,
    unit: &str,
    elapsed: Duration,
)
{
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { items as f64 / secs } else { 0.0 };
    info!(
        "{phase}: {items} {unit} in {secs:.2}s ({rate:.1} {unit}/s)"
    );
}

/// `jsdedup dedupe` entry point
pub fn run(
    args: DedupeArgs,
    ctx: &AppContext,
) -> anyhow::Result<()>
{
    let config = load_config(ctx.config.as_deref())?;
    let mut engine_config = EngineConfig::from_config(&config);

    if let Some(t) = args.threshold
    {
        engine_config.similarity_threshold = t;
    }
    if let Some(n) = args.workers
    {
        engine_config.max_workers = Some(n);
    }
    if let Some(ext) = &args.extension
    {
        engine_config.extension = ext.clone();
    }
    if let Some(pref) = args.executor
    {
        engine_config.executor = pref;
    }
    engine_config
        .ignore_patterns
        .extend(args.ignore);
    engine_config.show_progress = !ctx.quiet && !args.json;

    let engine = DedupEngine::new(engine_config).context("Failed to start engine")?;

    if ctx.dry_run
    {
        let started = Instant::now();
        let analysis = engine
            .analyze(&args.input)
            .with_context(|| format!("Failed to analyze {}", args.input.display()))?;
        let partition = Partition::plan(&analysis);
        let summary = RunSummary::build(&analysis, &partition, 0, engine.executor(), started.elapsed());
        if args.json
        {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        else if !ctx.quiet
        {
            let banner = "DRY RUN: nothing written";
            if ctx.no_color { println!("{banner}") } else { println!("{}", banner.yellow()) }
            print_summary(&summary, &args.output, ctx.no_color);
        }
        return Ok(());
    }

    let summary = engine
        .run(&args.input, &args.output)
        .with_context(|| format!("Failed to deduplicate {}", args.input.display()))?;

    if args.json
    {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    else if !ctx.quiet
    {
        print_summary(&summary, &args.output, ctx.no_color);
    }
    Ok(())
}

fn print_summary(
    summary: &RunSummary,
    output: &Path,
    no_color: bool,
)
{
    let paint = |mark: &str, color: fn(&str) -> String| {
        if no_color { mark.to_string() } else { color(mark) }
    };

    println!(
        "{} Processed {} files in {:.2}s ({:.1} files/s)",
        paint("✓", |m| m.green().to_string()),
        summary.total_files,
        summary.processing_time_seconds,
        summary.files_per_second
    );
    println!("  exact-duplicate groups: {}", summary.exact_duplicate_groups);
    if summary.absorbed_exact_groups > 0
    {
        println!("    (+{} inside similar groups)", summary.absorbed_exact_groups);
    }
    println!("  similar groups:         {}", summary.similar_groups);
    println!("  unique files:           {}", summary.unique_files);
    println!("  merged corpus:          {}", summary.merged_files);
    if summary.skipped_files > 0
    {
        println!("  {} {} files skipped", paint("!", |m| m.yellow().to_string()), summary.skipped_files);
    }
    if summary.write_failures > 0
    {
        println!("  {} {} files failed to copy", paint("!", |m| m.red().to_string()), summary.write_failures);
    }
    println!("  output: {}", output.display());
}
