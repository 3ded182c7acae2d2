//! Single-file and single-pair diagnostics: `inspect` and `compare`.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::cli::{AppContext, CompareArgs, InspectArgs};
use crate::core::features::{FeatureExtractor, FeatureRecord};
use crate::core::similarity::{Scored, SimilarityScore, SimilarityScorer, size_ratio};
use crate::infra::config::load_config;
use crate::infra::io::{Document, TextEncoding, read_document};

#[derive(Debug, Serialize)]
struct InspectOutput<'a>
{
    path: String,
    encoding: TextEncoding,
    #[serde(flatten)]
    features: &'a FeatureRecord,
}

fn load(
    extractor: &FeatureExtractor,
    path: &Path,
) -> Result<(Document, FeatureRecord)>
{
    let root = path
        .parent()
        .unwrap_or_else(|| Path::new(""));
    let doc = read_document(path, root)?;
    let features = extractor
        .extract(&doc)
        .with_context(|| format!("{} has no content to compare", path.display()))?;
    Ok((doc, features))
}

/// `jsdedup inspect FILE`: print the feature record as JSON
pub fn inspect_run(
    args: InspectArgs,
    _ctx: &AppContext,
) -> Result<()>
{
    let extractor = FeatureExtractor::new()?;
    let (doc, features) = load(&extractor, &args.file)?;

    let out = InspectOutput {
        path: args
            .file
            .display()
            .to_string(),
        encoding: doc.encoding,
        features: &features,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// `jsdedup compare A B`: every component for one pair, discard rules
/// bypassed
pub fn compare_run(
    args: CompareArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config(ctx.config.as_deref())?;
    let threshold = args
        .threshold
        .unwrap_or(config.dedupe.similarity_threshold);
    let scorer = SimilarityScorer::new(threshold)?;
    let extractor = FeatureExtractor::new()?;

    let (_, fa) = load(&extractor, &args.first)?;
    let (_, fb) = load(&extractor, &args.second)?;

    let score = scorer.components(
        Scored { path: &args.first, features: &fa },
        Scored { path: &args.second, features: &fb },
    )?;
    let ratio = size_ratio(fa.size, fb.size);

    if args.json
    {
        println!("{}", serde_json::to_string_pretty(&score)?);
    }
    else
    {
        print_score(&score, ratio, threshold, ctx.no_color);
    }
    Ok(())
}

fn print_score(
    score: &SimilarityScore,
    ratio: f64,
    threshold: f64,
    no_color: bool,
)
{
    println!("{} <-> {}", score.file1.display(), score.file2.display());
    println!("  content:    {:.3}", score.content);
    println!("  structural: {:.3}", score.structural);
    println!("  functions:  {:.3}", score.function);
    println!("  variables:  {:.3}", score.variable);
    println!("  size ratio: {ratio:.3}");

    let verdict = if score.is_duplicate { "duplicate" } else { "distinct" };
    if no_color
    {
        println!("  overall:    {:.3} (threshold {threshold:.2}) {verdict}", score.overall);
    }
    else if score.is_duplicate
    {
        println!(
            "  overall:    {:.3} (threshold {threshold:.2}) {}",
            score.overall,
            verdict.green()
        );
    }
    else
    {
        println!(
            "  overall:    {:.3} (threshold {threshold:.2}) {}",
            score.overall,
            verdict.yellow()
        );
    }
    for reason in &score.reasons
    {
        println!("  - {reason}");
    }
}
