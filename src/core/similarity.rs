//! Pairwise similarity model.
//!
//! Four component scores are combined into one weighted score:
//! aligned content, structural fingerprint cosine, and Jaccard over
//! function and variable names. Cheap checks run first: digest equality
//! short-circuits to a perfect score, a size ratio below one half discards
//! the pair, and a composite below 70% of the threshold is not reported.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use crate::core::features::{FeatureRecord, StructureKind};
use crate::error::{DedupError, Result};

/// Pairs whose size ratio falls below this are never compared
pub const MIN_SIZE_RATIO: f64 = 0.5;

/// Texts longer than this (in chars) are sampled before alignment
pub const ALIGNMENT_SAMPLE_TRIGGER: usize = 10_000;

/// Sample length used once the trigger is exceeded
pub const ALIGNMENT_SAMPLE_LEN: usize = 1_000;

/// Fraction of the threshold a score must reach to be reported at all
pub const PRESCREEN_FACTOR: f64 = 0.7;

/// Component weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights
{
    pub content: f64,
    pub structural: f64,
    pub function: f64,
    pub variable: f64,
}

impl Default for ScoringWeights
{
    fn default() -> Self
    {
        Self { content: 0.4, structural: 0.3, function: 0.15, variable: 0.15 }
    }
}

/// Score for one evaluated pair. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityScore
{
    pub file1: PathBuf,
    pub file2: PathBuf,
    pub content: f64,
    pub structural: f64,
    pub function: f64,
    pub variable: f64,
    pub overall: f64,
    pub is_duplicate: bool,
    pub reasons: Vec<String>,
}

/// A feature record paired with the identity used in scores
#[derive(Debug, Clone, Copy)]
pub struct Scored<'a>
{
    pub path: &'a Path,
    pub features: &'a FeatureRecord,
}

#[derive(Debug, Clone)]
pub struct SimilarityScorer
{
    threshold: f64,
    weights: ScoringWeights,
}

impl SimilarityScorer
{
    pub fn new(threshold: f64) -> Result<Self>
    {
        if !(threshold > 0.0 && threshold <= 1.0)
        {
            return Err(DedupError::Config(format!(
                "similarity threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(Self { threshold, weights: ScoringWeights::default() })
    }

    pub fn threshold(&self) -> f64
    {
        self.threshold
    }

    /// Score a pair. `Ok(None)` means the pair was discarded by the size
    /// pre-filter or the pre-screen.
    pub fn score(
        &self,
        a: Scored<'_>,
        b: Scored<'_>,
    ) -> Result<Option<SimilarityScore>>
    {
        if a.features
            .digest
            == b.features
                .digest
        {
            return Ok(Some(identical(a.path, b.path)));
        }

        if size_ratio(a.features.size, b.features.size) < MIN_SIZE_RATIO
        {
            return Ok(None);
        }

        let score = self.components(a, b)?;

        if score.overall < self.threshold * PRESCREEN_FACTOR
        {
            return Ok(None);
        }

        Ok(Some(score))
    }

    /// Compute every component without the discard rules.
    pub fn components(
        &self,
        a: Scored<'_>,
        b: Scored<'_>,
    ) -> Result<SimilarityScore>
    {
        if a.features
            .digest
            == b.features
                .digest
        {
            return Ok(identical(a.path, b.path));
        }

        let content = content_similarity(a.features, b.features);
        let structural = structural_similarity(&a.features.structure, &b.features.structure);
        let function = jaccard(&a.features.functions, &b.features.functions);
        let variable = jaccard(&a.features.variables, &b.features.variables);

        let w = self.weights;
        let overall = content * w.content
            + structural * w.structural
            + function * w.function
            + variable * w.variable;

        for (name, value) in [
            ("content", content),
            ("structural", structural),
            ("function", function),
            ("variable", variable),
            ("overall", overall),
        ]
        {
            if !value.is_finite()
            {
                return Err(DedupError::Scoring {
                    file1: a.path.to_path_buf(),
                    file2: b.path.to_path_buf(),
                    reason: format!("{name} similarity is not finite"),
                });
            }
        }

        let mut reasons = Vec::new();
        if content > 0.9
        {
            reasons.push(format!("highly similar content ({content:.2})"));
        }
        if structural > 0.9
        {
            reasons.push(format!("highly similar structure ({structural:.2})"));
        }
        if function > 0.8
        {
            reasons.push(format!("high function name overlap ({function:.2})"));
        }
        if variable > 0.8
        {
            reasons.push(format!("high variable name overlap ({variable:.2})"));
        }

        Ok(SimilarityScore {
            file1: a.path.to_path_buf(),
            file2: b.path.to_path_buf(),
            content,
            structural,
            function,
            variable,
            overall,
            is_duplicate: overall >= self.threshold,
            reasons,
        })
    }
}

fn identical(
    file1: &Path,
    file2: &Path,
) -> SimilarityScore
{
    SimilarityScore {
        file1: file1.to_path_buf(),
        file2: file2.to_path_buf(),
        content: 1.0,
        structural: 1.0,
        function: 1.0,
        variable: 1.0,
        overall: 1.0,
        is_duplicate: true,
        reasons: vec!["identical normalized content digest".to_string()],
    }
}

/// min/max of the two sizes; two empty sizes count as equal
pub fn size_ratio(
    a: u64,
    b: u64,
) -> f64
{
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if hi == 0 { 1.0 } else { lo as f64 / hi as f64 }
}

/// Alignment ratio (2·matches / total chars) of the normalized texts.
///
/// The pair is ordered by digest first, so the result does not depend on
/// argument order.
pub fn content_similarity(
    a: &FeatureRecord,
    b: &FeatureRecord,
) -> f64
{
    let (first, second) = if a.digest <= b.digest { (a, b) } else { (b, a) };
    let (mut left, mut right) = (first.normalized.as_str(), second.normalized.as_str());

    if left.is_empty() || right.is_empty()
    {
        return 0.0;
    }

    let (left_len, right_len) = (
        left.chars()
            .count(),
        right
            .chars()
            .count(),
    );
    if left_len > ALIGNMENT_SAMPLE_TRIGGER || right_len > ALIGNMENT_SAMPLE_TRIGGER
    {
        // Both sides share one sample length, bounded by the shorter text
        let sample = ALIGNMENT_SAMPLE_LEN
            .min(left_len)
            .min(right_len);
        left = char_prefix(left, sample);
        right = char_prefix(right, sample);
    }

    f64::from(TextDiff::from_chars(left, right).ratio())
}

fn char_prefix(
    s: &str,
    n: usize,
) -> &str
{
    match s
        .char_indices()
        .nth(n)
    {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Cosine similarity over the union of categories
pub fn structural_similarity(
    a: &BTreeMap<StructureKind, usize>,
    b: &BTreeMap<StructureKind, usize>,
) -> f64
{
    if a.is_empty() && b.is_empty()
    {
        return 1.0;
    }
    if a.is_empty() || b.is_empty()
    {
        return 0.0;
    }

    let keys: BTreeSet<&StructureKind> = a
        .keys()
        .chain(b.keys())
        .collect();

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for key in keys
    {
        let x = a
            .get(key)
            .copied()
            .unwrap_or(0) as f64;
        let y = b
            .get(key)
            .copied()
            .unwrap_or(0) as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0
    {
        return 0.0;
    }

    // One sqrt over the product keeps identical vectors at exactly 1.0
    (dot / (norm_a * norm_b).sqrt()).min(1.0)
}

/// |A ∩ B| / |A ∪ B|; two empty sets are identical, one empty set shares nothing
pub fn jaccard(
    a: &BTreeSet<String>,
    b: &BTreeSet<String>,
) -> f64
{
    if a.is_empty() && b.is_empty()
    {
        return 1.0;
    }
    if a.is_empty() || b.is_empty()
    {
        return 0.0;
    }

    let intersection = a
        .intersection(b)
        .count();
    let union = a.len() + b.len() - intersection;

    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::features::FeatureExtractor;

    fn record(text: &str) -> FeatureRecord
    {
        FeatureExtractor::new()
            .unwrap()
            .extract_text(text, text.len() as u64, 1)
            .unwrap()
    }

    fn scored<'a>(
        path: &'a str,
        rec: &'a FeatureRecord,
    ) -> Scored<'a>
    {
        Scored { path: Path::new(path), features: rec }
    }

    fn names(items: &[&str]) -> BTreeSet<String>
    {
        items
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn jaccard_conventions()
    {
        assert_eq!(jaccard(&names(&[]), &names(&[])), 1.0);
        assert_eq!(jaccard(&names(&["a"]), &names(&[])), 0.0);
        assert_eq!(jaccard(&names(&["a", "b"]), &names(&["b", "c"])), 1.0 / 3.0);
    }

    #[test]
    fn structural_cosine_edges()
    {
        let empty = BTreeMap::new();
        let zeros: BTreeMap<_, _> = StructureKind::ALL
            .iter()
            .map(|&k| (k, 0))
            .collect();
        let mut some = zeros.clone();
        some.insert(StructureKind::Conditional, 3);

        assert_eq!(structural_similarity(&empty, &empty), 1.0);
        assert_eq!(structural_similarity(&empty, &some), 0.0);
        assert_eq!(structural_similarity(&zeros, &zeros), 0.0);
        assert_eq!(structural_similarity(&some, &some), 1.0);

        let mut other = zeros.clone();
        other.insert(StructureKind::LoopFor, 2);
        assert_eq!(structural_similarity(&some, &other), 0.0);
    }

    #[test]
    fn digest_match_short_circuits()
    {
        let a = record("var a = 1; // one");
        let b = record("var a = 1;    /* two, and much longer than the first comment */");
        let scorer = SimilarityScorer::new(1.0).unwrap();

        let s = scorer
            .score(scored("a.js", &a), scored("b.js", &b))
            .unwrap()
            .expect("identical digests always score");
        assert_eq!(s.overall, 1.0);
        assert!(s.is_duplicate);
        assert_eq!(s.reasons, vec!["identical normalized content digest".to_string()]);
    }

    #[test]
    fn size_prefilter_discards_small_vs_large()
    {
        let small = record("var d = 1;");
        let big_text = format!("var e = 1;{}", " x();".repeat(2000));
        let big = record(&big_text);
        let scorer = SimilarityScorer::new(0.8).unwrap();

        assert!(size_ratio(small.size, big.size) < MIN_SIZE_RATIO);
        assert!(
            scorer
                .score(scored("d.js", &small), scored("e.js", &big))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn renamed_locals_are_near_duplicates()
    {
        let original = record(
            "function render(list) { var total = 0; var index = 0; var label = 'x';\n\
             for (index = 0; index < list.length; index++) { if (list[index]) { total += 1; } }\n\
             return { total: total, label: label }; }",
        );
        let renamed = record(
            "function render(list) { var sum = 0; var index = 0; var label = 'x';\n\
             for (index = 0; index < list.length; index++) { if (list[index]) { sum += 1; } }\n\
             return { total: sum, label: label }; }",
        );
        let scorer = SimilarityScorer::new(0.8).unwrap();

        let s = scorer
            .score(scored("a.js", &original), scored("c.js", &renamed))
            .unwrap()
            .expect("reported");
        assert_eq!(s.structural, 1.0);
        assert_eq!(s.function, 1.0);
        assert!(s.variable < 1.0);
        assert!(s.content > 0.85, "content {}", s.content);
        assert!(s.is_duplicate, "overall {}", s.overall);
    }

    #[test]
    fn unrelated_documents_are_prescreened()
    {
        let a = record("function alpha() { var one = [1, 2, 3]; return one.length; }");
        let b = record("function omega(q) { let zed = q * 7; while (zed) { zed--; } }  ");
        let scorer = SimilarityScorer::new(0.8).unwrap();

        let full = scorer
            .components(scored("a.js", &a), scored("b.js", &b))
            .unwrap();
        assert_eq!(full.function, 0.0);
        assert_eq!(full.variable, 0.0);
        assert!(full.overall <= 0.7);
        assert!(!full.is_duplicate);
    }

    #[test]
    fn score_is_symmetric()
    {
        let a = record("function f(a) { var x = a + 1; if (x) { return [x]; } }");
        let b = record("function f(b) { var y = b + 1; if (y) { return [y, y]; } }");
        let scorer = SimilarityScorer::new(0.5).unwrap();

        let ab = scorer
            .components(scored("a.js", &a), scored("b.js", &b))
            .unwrap();
        let ba = scorer
            .components(scored("b.js", &b), scored("a.js", &a))
            .unwrap();
        assert_eq!(ab.overall, ba.overall);
        assert_eq!(ab.content, ba.content);
    }

    #[test]
    fn long_texts_are_sampled()
    {
        let head = "var shared = 1; ".repeat(70);
        let a = record(&format!("{head}{}", "a".repeat(11_000)));
        let b = record(&format!("{head}{}", "b".repeat(11_000)));

        // Both samples are the shared 1,000-char prefix
        assert_eq!(content_similarity(&a, &b), 1.0);
    }

    #[test]
    fn sample_length_follows_the_shorter_text()
    {
        let short = record(&"q".repeat(500));
        let long = record(&format!("{}{}", "q".repeat(500), "z".repeat(12_000)));

        // Both cut to 500 chars, so the shared prefix aligns fully
        assert_eq!(content_similarity(&short, &long), 1.0);
    }

    #[test]
    fn invalid_threshold_is_rejected()
    {
        assert!(SimilarityScorer::new(0.0).is_err());
        assert!(SimilarityScorer::new(1.01).is_err());
        assert!(SimilarityScorer::new(1.0).is_ok());
    }
}
