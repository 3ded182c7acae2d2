//! Filepath: src/infra/walk.rs
//! Recursive corpus discovery.
//! - Extension filter (case-insensitive, leading dot optional)
//! - Extra ignore globs (early prune + late filter)
//! - Excluded roots, so an output directory nested inside the
//!   input is never re-ingested on the next run
//! - Ignore files are opt-in: upstream corpora are not git trees
//! - Deterministic ordering for stable runs and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::warn;

use crate::error::{DedupError, Result};

/// Corpus walker with optional extra ignore globs and filters.
/// Extra globs are applied in two places:
///   1) Early: prune directories during traversal (filter_entry).
///   2) Late: filter out files that still slipped through.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Lowercased extension without the dot; None keeps every file
    extension: Option<String>,

    /// Directories never descended into
    excluded_roots: Vec<PathBuf>,

    /// Honour .gitignore/.ignore files; default false
    respect_ignore_files: bool,

    /// Follow symbolic links; default false
    follow_symlinks: bool,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g.
    /// "node_modules/**", "**/*.min.js"). Patterns match on relative paths.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            let glob = Glob::new(pattern)
                .map_err(|e| DedupError::Config(format!("invalid ignore pattern {pattern:?}: {e}")))?;
            builder.add(glob);
        }

        let ignore_patterns = builder
            .build()
            .map_err(|e| DedupError::Config(e.to_string()))?;

        Ok(Self {
            ignore_patterns,
            extension: None,
            excluded_roots: Vec::new(),
            respect_ignore_files: false,
            follow_symlinks: false,
        })
    }

    /// Keep only files with this extension ("js" or ".js")
    pub fn with_extension(
        mut self,
        ext: &str,
    ) -> Self
    {
        let ext = ext
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        self.extension = (!ext.is_empty()).then_some(ext);
        self
    }

    /// Never descend into `dir`
    pub fn with_excluded_root(
        mut self,
        dir: &Path,
    ) -> Self
    {
        self.excluded_roots
            .push(dir.to_path_buf());
        self
    }

    /// (Optional) Respect .gitignore and .ignore files.
    pub fn with_respect_ignore_files(
        mut self,
        respect: bool,
    ) -> Self
    {
        self.respect_ignore_files = respect;
        self
    }

    /// (Optional) Follow or skip symbolic links (default false).
    pub fn with_follow_symlinks(
        mut self,
        follow: bool,
    ) -> Self
    {
        self.follow_symlinks = follow;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Corpus files may be dotfiles; never skip them
        b.hidden(false);

        b.ignore(self.respect_ignore_files);
        b.git_ignore(self.respect_ignore_files);
        b.git_global(self.respect_ignore_files);
        b.git_exclude(self.respect_ignore_files);
        b.parents(self.respect_ignore_files);
        b.require_git(false);

        b.follow_links(self.follow_symlinks);

        let extra = self
            .ignore_patterns
            .clone();
        let excluded = self
            .excluded_roots
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);

            if !is_dir
            {
                return true;
            }

            if excluded
                .iter()
                .any(|ex| ent.path() == ex.as_path())
            {
                return false;
            }

            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            !extra.is_match(rel)
        });

        b
    }

    fn extension_matches(
        &self,
        path: &Path,
    ) -> bool
    {
        match &self.extension
        {
            None => true,
            Some(want) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(want)),
        }
    }

    /// Traverse files under `root`, respecting the filters.
    /// Returns a **sorted** list of file paths for determinism.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            .filter_map(|res| {
                res.map_err(|e| warn!("skipping unreadable entry: {e}"))
                    .ok()
            })
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|abs| self.extension_matches(abs))
            // Late file-level extra ignore filtering using RELATIVE path
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort();

        out
    }
}
