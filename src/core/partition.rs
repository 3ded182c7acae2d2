//! Output partitioning: which bucket every document lands in, and the
//! copies that materialize those buckets on disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::engine::Analysis;
use crate::core::exact::ExactDuplicateIndex;
use crate::error::DedupError;

pub const UNIQUE_DIR: &str = "unique";
pub const EXACT_DIR: &str = "exact_duplicates";
pub const SIMILAR_DIR: &str = "similar_groups";
pub const MERGED_DIR: &str = "merged";

/// One copy that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure
{
    pub path: PathBuf,
    pub reason: String,
}

impl From<DedupError> for WriteFailure
{
    fn from(e: DedupError) -> Self
    {
        let path = match &e
        {
            DedupError::OutputWrite { path, .. } => path.clone(),
            _ => PathBuf::new(),
        };
        Self { path, reason: e.to_string() }
    }
}

/// Bucket assignment over `Analysis::documents` indices.
///
/// Every document appears in exactly one bucket. Each bucket is ascending,
/// so its first entry is the representative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition
{
    pub unique: Vec<usize>,
    /// `exact[n]` is written to `exact_group_<n + 1>`
    pub exact: Vec<Vec<usize>>,
    /// `similar[k]` holds cluster `k` plus the exact copies of its members
    pub similar: Vec<Vec<usize>>,
    /// `absorbed[k]` lists the exact groups folded into `similar[k]`
    pub absorbed: Vec<Vec<Vec<usize>>>,
}

impl Partition
{
    /// Documents whose digest representative sits in a near-duplicate
    /// cluster follow it there, exact copies included. Remaining exact
    /// groups get their own bucket. Everything else is unique.
    pub fn plan(analysis: &Analysis) -> Self
    {
        let docs = &analysis.documents;
        let index = ExactDuplicateIndex::build(
            docs.iter()
                .map(|d| &d.features.digest),
        );

        let cluster_of: HashMap<&Path, usize> = analysis
            .clusters
            .iter()
            .enumerate()
            .flat_map(|(k, c)| {
                c.members
                    .iter()
                    .map(move |m| (m.as_path(), k))
            })
            .collect();

        let clusters = analysis
            .clusters
            .len();
        let mut plan = Self {
            similar: vec![Vec::new(); clusters],
            absorbed: vec![Vec::new(); clusters],
            ..Self::default()
        };
        for rep in index.candidates()
        {
            let members = index.members(&docs[rep].features.digest);
            if let Some(&k) = cluster_of.get(docs[rep].relative.as_path())
            {
                plan.similar[k].extend_from_slice(members);
                if members.len() > 1
                {
                    plan.absorbed[k].push(members.to_vec());
                }
            }
            else if members.len() > 1
            {
                plan.exact
                    .push(members.to_vec());
            }
            else
            {
                plan.unique
                    .push(rep);
            }
        }

        for bucket in &mut plan.similar
        {
            bucket.sort_unstable();
        }
        plan
    }

    /// One document per bucket, ascending
    pub fn merged(&self) -> Vec<usize>
    {
        let mut merged: Vec<usize> = self
            .unique
            .iter()
            .copied()
            .chain(
                self.exact
                    .iter()
                    .map(|b| b[0]),
            )
            .chain(
                self.similar
                    .iter()
                    .map(|b| b[0]),
            )
            .collect();
        merged.sort_unstable();
        merged
    }

    /// Documents across all buckets
    pub fn document_count(&self) -> usize
    {
        self.unique
            .len()
            + self
                .exact
                .iter()
                .map(Vec::len)
                .sum::<usize>()
            + self
                .similar
                .iter()
                .map(Vec::len)
                .sum::<usize>()
    }
}

/// Writes a [`Partition`] beneath one output directory
pub struct OutputPartitioner
{
    root: PathBuf,
}

impl OutputPartitioner
{
    pub fn new(root: &Path) -> Self
    {
        Self { root: root.to_path_buf() }
    }

    /// Copy every document into its bucket and every representative into
    /// `merged/`. Failures are collected, never fatal.
    pub fn write(
        &self,
        analysis: &Analysis,
        partition: &Partition,
    ) -> Vec<WriteFailure>
    {
        let mut failures = Vec::new();

        self.copy_bucket(analysis, &self.root.join(UNIQUE_DIR), &partition.unique, &mut failures);
        for (n, bucket) in partition
            .exact
            .iter()
            .enumerate()
        {
            let dir = self
                .root
                .join(EXACT_DIR)
                .join(format!("exact_group_{}", n + 1));
            self.copy_bucket(analysis, &dir, bucket, &mut failures);
        }
        for (n, bucket) in partition
            .similar
            .iter()
            .enumerate()
        {
            let dir = self
                .root
                .join(SIMILAR_DIR)
                .join(format!("similar_group_{}", n + 1));
            self.copy_bucket(analysis, &dir, bucket, &mut failures);
        }
        self.copy_bucket(
            analysis,
            &self.root.join(MERGED_DIR),
            &partition.merged(),
            &mut failures,
        );

        info!(
            root = %self.root.display(),
            failures = failures.len(),
            "output written"
        );
        failures
    }

    fn copy_bucket(
        &self,
        analysis: &Analysis,
        dir: &Path,
        bucket: &[usize],
        failures: &mut Vec<WriteFailure>,
    )
    {
        if let Err(source) = fs::create_dir_all(dir)
        {
            let err = DedupError::OutputWrite { path: dir.to_path_buf(), source };
            warn!("{err}");
            failures.push(err.into());
            return;
        }

        let mut names = NameAllocator::default();
        for &i in bucket
        {
            let doc = &analysis.documents[i];
            let dest = dir.join(names.allocate(&doc.relative));
            match fs::copy(&doc.path, &dest)
            {
                Ok(_) => debug!(from = %doc.path.display(), to = %dest.display(), "copied"),
                Err(source) =>
                {
                    let err = DedupError::OutputWrite { path: dest, source };
                    warn!("{err}");
                    failures.push(err.into());
                }
            }
        }
    }
}

/// Hands out flattened, collision-free file names within one directory
#[derive(Debug, Default)]
pub struct NameAllocator
{
    used: HashSet<String>,
}

impl NameAllocator
{
    pub fn allocate(
        &mut self,
        relative: &Path,
    ) -> String
    {
        let base = flatten_name(relative);
        if self
            .used
            .insert(base.clone())
        {
            return base;
        }

        let (stem, ext) = match base.rfind('.')
        {
            Some(dot) if dot > 0 => (&base[..dot], &base[dot..]),
            _ => (base.as_str(), ""),
        };
        let mut n = 1;
        loop
        {
            let candidate = format!("{stem}_{n}{ext}");
            if self
                .used
                .insert(candidate.clone())
            {
                return candidate;
            }
            n += 1;
        }
    }
}

/// `lib/util/a.js` becomes `lib__util__a.js`
pub fn flatten_name(relative: &Path) -> String
{
    relative
        .components()
        .filter_map(|c| match c
        {
            Component::Normal(part) => Some(
                part.to_string_lossy()
                    .into_owned(),
            ),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("__")
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn flattens_nested_paths()
    {
        assert_eq!(flatten_name(Path::new("a.js")), "a.js");
        assert_eq!(flatten_name(Path::new("lib/util/a.js")), "lib__util__a.js");
    }

    #[test]
    fn collisions_get_numeric_suffix()
    {
        let mut names = NameAllocator::default();
        assert_eq!(names.allocate(Path::new("a__b.js")), "a__b.js");
        assert_eq!(names.allocate(Path::new("a/b.js")), "a__b_1.js");
        assert_eq!(names.allocate(Path::new("a/b.js")), "a__b_2.js");
        assert_eq!(names.allocate(Path::new("noext")), "noext");
        assert_eq!(names.allocate(Path::new("noext")), "noext_1");
    }

    #[test]
    fn merged_takes_one_per_bucket()
    {
        let p = Partition {
            unique: vec![4, 0],
            exact: vec![vec![1, 2]],
            similar: vec![vec![3, 5, 6]],
            absorbed: vec![vec![vec![3, 5]]],
        };
        assert_eq!(p.merged(), vec![0, 1, 3, 4]);
        assert_eq!(p.document_count(), 7);
    }
}
