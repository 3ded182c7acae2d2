//! Lexical feature extraction for JavaScript documents.
//!
//! Patterns are compiled once per [`FeatureExtractor`] and shared by
//! reference across workers (`Regex` is `Sync`). Nothing here parses
//! JavaScript; every feature is a regex scan over the raw text.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{DedupError, Result};
use crate::infra::io::Document;

/// Syntactic construct categories counted for the structural fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind
{
    Conditional,
    LoopFor,
    LoopWhile,
    ExceptionHandler,
    ObjectLiteral,
    ArrayLiteral,
    ArrowFunction,
    AsyncConstruct,
}

impl StructureKind
{
    pub const ALL: [StructureKind; 8] = [
        StructureKind::Conditional,
        StructureKind::LoopFor,
        StructureKind::LoopWhile,
        StructureKind::ExceptionHandler,
        StructureKind::ObjectLiteral,
        StructureKind::ArrayLiteral,
        StructureKind::ArrowFunction,
        StructureKind::AsyncConstruct,
    ];

    fn pattern(self) -> &'static str
    {
        match self
        {
            StructureKind::Conditional => r"\bif\s*\(",
            StructureKind::LoopFor => r"\bfor\s*\(",
            StructureKind::LoopWhile => r"\bwhile\s*\(",
            StructureKind::ExceptionHandler => r"\btry\s*\{",
            StructureKind::ObjectLiteral => r"\{[^}]*\}",
            StructureKind::ArrayLiteral => r"\[[^\]]*\]",
            StructureKind::ArrowFunction => r"=>",
            StructureKind::AsyncConstruct => r"\b(?:async|await)\b",
        }
    }
}

/// BLAKE3 digest of normalized content
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(blake3::Hash);

impl ContentDigest
{
    pub fn of(normalized: &str) -> Self
    {
        Self(blake3::hash(normalized.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32]
    {
        self.0
            .as_bytes()
    }
}

impl PartialOrd for ContentDigest
{
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<std::cmp::Ordering>
    {
        Some(self.cmp(other))
    }
}

impl Ord for ContentDigest
{
    fn cmp(
        &self,
        other: &Self,
    ) -> std::cmp::Ordering
    {
        self.as_bytes()
            .cmp(other.as_bytes())
    }
}

impl fmt::Display for ContentDigest
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.write_str(
            self.0
                .to_hex()
                .as_str(),
        )
    }
}

impl fmt::Debug for ContentDigest
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        write!(f, "ContentDigest({self})")
    }
}

impl Serialize for ContentDigest
{
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    {
        serializer.collect_str(self)
    }
}

/// Features derived from one document. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord
{
    /// Names of `function name(...) {` declarations
    pub functions: BTreeSet<String>,

    /// Names introduced by `var`, `let` or `const`
    pub variables: BTreeSet<String>,

    /// Specifiers passed to `import` / `require`
    pub imports: BTreeSet<String>,

    /// Hex-looking keys bound to module factory functions
    pub bundler_modules: BTreeSet<String>,

    /// Occurrence count per category; every category is present
    pub structure: BTreeMap<StructureKind, usize>,

    /// Comment-free, whitespace-collapsed text
    #[serde(skip)]
    pub normalized: String,

    pub digest: ContentDigest,

    /// Raw size in bytes
    pub size: u64,

    pub line_count: usize,
}

/// Compiled pattern set. Build once per run.
pub struct FeatureExtractor
{
    function: Regex,
    variable: Regex,
    dynamic_import: Regex,
    static_import: Regex,
    bundler_module: Regex,
    comment: Regex,
    whitespace: Regex,
    structure: Vec<(StructureKind, Regex)>,
}

impl FeatureExtractor
{
    pub fn new() -> Result<Self>
    {
        let structure = StructureKind::ALL
            .iter()
            .map(|&kind| Ok((kind, compile(kind.pattern())?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            function: compile(r"function\s+([\w$]+)\s*\([^)]*\)\s*\{")?,
            variable: compile(r"\b(?:var|let|const)\s+([\w$]+)")?,
            dynamic_import: compile(r#"\b(?:import|require)\s*\(\s*["']([^"']+)["']"#)?,
            static_import: compile(r#"\bimport\s+(?:[\w$*{}\s,]+\s+from\s+)?["']([^"']+)["']"#)?,
            bundler_module: compile(
                r#""([a-f0-9]+)"\s*:\s*(?:function\s*\([^)]*\)|\([^)]*\)\s*=>)"#,
            )?,
            comment: compile(r"(?s)//[^\n]*|/\*.*?\*/")?,
            whitespace: compile(r"\s+")?,
            structure,
        })
    }

    /// Extract features from a decoded document. `None` for empty content;
    /// the caller excludes such documents from comparison.
    pub fn extract(
        &self,
        doc: &Document,
    ) -> Option<FeatureRecord>
    {
        self.extract_text(&doc.text, doc.size, doc.line_count)
    }

    /// Extract features from raw text with explicit size and line count
    pub fn extract_text(
        &self,
        text: &str,
        size: u64,
        line_count: usize,
    ) -> Option<FeatureRecord>
    {
        if text.is_empty()
        {
            return None;
        }

        let structure = self
            .structure
            .iter()
            .map(|(kind, re)| {
                (
                    *kind,
                    re.find_iter(text)
                        .count(),
                )
            })
            .collect();

        let normalized = self.normalize(text);
        let digest = ContentDigest::of(&normalized);

        let mut imports = captures(&self.dynamic_import, text);
        imports.extend(captures(&self.static_import, text));

        Some(FeatureRecord {
            functions: captures(&self.function, text),
            variables: captures(&self.variable, text),
            imports,
            bundler_modules: captures(&self.bundler_module, text),
            structure,
            normalized,
            digest,
            size,
            line_count,
        })
    }

    /// Strip comments, collapse whitespace runs to one space, trim
    pub fn normalize(
        &self,
        text: &str,
    ) -> String
    {
        let stripped = self
            .comment
            .replace_all(text, "");
        self.whitespace
            .replace_all(&stripped, " ")
            .trim()
            .to_string()
    }
}

fn compile(pattern: &str) -> Result<Regex>
{
    Regex::new(pattern).map_err(|e| DedupError::Config(format!("bad pattern {pattern}: {e}")))
}

/// First capture group of every match, deduplicated
fn captures(
    re: &Regex,
    text: &str,
) -> BTreeSet<String>
{
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .to_string()
        })
        .collect()
}
