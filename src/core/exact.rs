//! Exact-duplicate grouping by normalized-content digest.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::features::ContentDigest;

/// Documents sharing one digest, sorted by path. The first member is the
/// representative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExactDuplicateGroup
{
    pub digest: ContentDigest,
    pub members: Vec<PathBuf>,
}

impl ExactDuplicateGroup
{
    pub fn representative(&self) -> &PathBuf
    {
        &self.members[0]
    }

    pub fn len(&self) -> usize
    {
        self.members
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.members
            .is_empty()
    }
}

/// Digest buckets over a batch of documents.
///
/// Built by the coordinator after extraction fan-in; never shared with
/// workers.
#[derive(Debug, Default)]
pub struct ExactDuplicateIndex
{
    buckets: IndexMap<ContentDigest, Vec<usize>>,
}

impl ExactDuplicateIndex
{
    /// Group `digests[i]` for every document index `i`. Callers pass
    /// documents already sorted by path so bucket order and
    /// representatives are stable.
    pub fn build<'a, I>(digests: I) -> Self
    where
        I: IntoIterator<Item = &'a ContentDigest>,
    {
        let mut buckets: IndexMap<ContentDigest, Vec<usize>> = IndexMap::new();
        for (idx, digest) in digests
            .into_iter()
            .enumerate()
        {
            buckets
                .entry(*digest)
                .or_default()
                .push(idx);
        }
        Self { buckets }
    }

    /// Number of distinct digests
    pub fn bucket_count(&self) -> usize
    {
        self.buckets
            .len()
    }

    /// One document index per bucket: the lowest index, which is the first
    /// in path order. Ascending.
    pub fn candidates(&self) -> Vec<usize>
    {
        let mut reps: Vec<usize> = self
            .buckets
            .values()
            .map(|members| members[0])
            .collect();
        reps.sort_unstable();
        reps
    }

    /// Member indices of the bucket holding `digest`
    pub fn members(
        &self,
        digest: &ContentDigest,
    ) -> &[usize]
    {
        self.buckets
            .get(digest)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Buckets with more than one member, as index lists
    pub fn multi_member_buckets(&self) -> impl Iterator<Item = (&ContentDigest, &[usize])>
    {
        self.buckets
            .iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(d, m)| (d, m.as_slice()))
    }

    /// Materialize exact-duplicate groups using `path_of` for member names
    pub fn groups<F>(
        &self,
        path_of: F,
    ) -> Vec<ExactDuplicateGroup>
    where
        F: Fn(usize) -> PathBuf,
    {
        let mut groups: Vec<ExactDuplicateGroup> = self
            .multi_member_buckets()
            .map(|(digest, members)| {
                let mut paths: Vec<PathBuf> = members
                    .iter()
                    .map(|&i| path_of(i))
                    .collect();
                paths.sort();
                ExactDuplicateGroup { digest: *digest, members: paths }
            })
            .collect();
        groups.sort_by(|a, b| {
            a.representative()
                .cmp(b.representative())
        });
        groups
    }
}
