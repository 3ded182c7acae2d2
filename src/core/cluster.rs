//! Near-duplicate clustering with a disjoint-set forest.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::similarity::SimilarityScore;

/// Disjoint-set over `0..n` with path compression and union by size.
/// `find` is iterative, so deep chains cannot exhaust the stack.
#[derive(Debug, Clone)]
pub struct UnionFind
{
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind
{
    pub fn new(n: usize) -> Self
    {
        Self { parent: (0..n).collect(), size: vec![1; n] }
    }

    pub fn len(&self) -> usize
    {
        self.parent
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.parent
            .is_empty()
    }

    pub fn find(
        &mut self,
        x: usize,
    ) -> usize
    {
        let mut root = x;
        while self.parent[root] != root
        {
            root = self.parent[root];
        }

        // Second pass: point every node on the path at the root
        let mut node = x;
        while self.parent[node] != root
        {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }

        root
    }

    /// Merge the sets holding `a` and `b`. Returns false if already joined.
    pub fn union(
        &mut self,
        a: usize,
        b: usize,
    ) -> bool
    {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb
        {
            return false;
        }
        if self.size[ra] < self.size[rb]
        {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    /// Every equivalence class, members ascending, classes ordered by their
    /// smallest member
    pub fn classes(&mut self) -> Vec<Vec<usize>>
    {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for x in 0..self.len()
        {
            let root = self.find(x);
            by_root
                .entry(root)
                .or_default()
                .push(x);
        }
        let mut classes: Vec<Vec<usize>> = by_root
            .into_values()
            .collect();
        classes.sort_by_key(|c| c[0]);
        classes
    }
}

/// Per-cluster statistics over the duplicate edges inside it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats
{
    pub member_count: usize,
    pub avg_similarity: f64,
    pub min_similarity: f64,
    pub max_similarity: f64,
    /// Bytes no longer needed once only the representative is kept
    pub total_saved_size: u64,
}

/// A near-duplicate cluster. Members sorted; first is the representative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster
{
    pub members: Vec<PathBuf>,
    pub stats: ClusterStats,
}

impl Cluster
{
    pub fn representative(&self) -> &PathBuf
    {
        &self.members[0]
    }
}

/// Single-owner aggregation of duplicate-classified scores into clusters.
///
/// Nodes are candidate documents, identified by their path.
#[derive(Debug)]
pub struct ClusterBuilder
{
    nodes: Vec<(PathBuf, u64)>,
    index: BTreeMap<PathBuf, usize>,
    forest: UnionFind,
    edges: Vec<(usize, usize, f64)>,
}

impl ClusterBuilder
{
    /// `nodes` are the candidates with their sizes
    pub fn new(nodes: Vec<(PathBuf, u64)>) -> Self
    {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, (p, _))| (p.clone(), i))
            .collect();
        let forest = UnionFind::new(nodes.len());
        Self { nodes, index, forest, edges: Vec::new() }
    }

    /// Merge the endpoints of a duplicate score. Non-duplicate scores and
    /// scores naming unknown documents are ignored.
    pub fn add(
        &mut self,
        score: &SimilarityScore,
    )
    {
        if !score.is_duplicate
        {
            return;
        }
        let (Some(&a), Some(&b)) = (self.index.get(&score.file1), self.index.get(&score.file2))
        else
        {
            return;
        };
        self.forest
            .union(a, b);
        self.edges
            .push((a, b, score.overall));
    }

    /// Finalize: classes with more than one member, ordered by representative
    pub fn finish(mut self) -> Vec<Cluster>
    {
        let classes = self
            .forest
            .classes();

        let mut root_of = vec![0usize; self.nodes.len()];
        for class in &classes
        {
            for &m in class
            {
                root_of[m] = class[0];
            }
        }

        let mut edge_scores: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for &(a, _, overall) in &self.edges
        {
            edge_scores
                .entry(root_of[a])
                .or_default()
                .push(overall);
        }

        let mut clusters: Vec<Cluster> = classes
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|class| {
                let scores = edge_scores
                    .remove(&class[0])
                    .unwrap_or_default();
                let mut members: Vec<(PathBuf, u64)> = class
                    .iter()
                    .map(|&i| self.nodes[i].clone())
                    .collect();
                members.sort();

                let total_saved_size = members
                    .iter()
                    .skip(1)
                    .map(|(_, size)| size)
                    .sum();
                let stats = ClusterStats {
                    member_count: members.len(),
                    avg_similarity: scores.iter().sum::<f64>() / scores.len().max(1) as f64,
                    min_similarity: scores
                        .iter()
                        .copied()
                        .fold(f64::INFINITY, f64::min)
                        .min(1.0),
                    max_similarity: scores
                        .iter()
                        .copied()
                        .fold(0.0, f64::max),
                    total_saved_size,
                };

                Cluster {
                    members: members
                        .into_iter()
                        .map(|(p, _)| p)
                        .collect(),
                    stats,
                }
            })
            .collect();

        clusters.sort_by(|a, b| {
            a.representative()
                .cmp(b.representative())
        });
        clusters
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn dup(
        a: &str,
        b: &str,
        overall: f64,
    ) -> SimilarityScore
    {
        SimilarityScore {
            file1: a.into(),
            file2: b.into(),
            content: overall,
            structural: overall,
            function: overall,
            variable: overall,
            overall,
            is_duplicate: true,
            reasons: vec![],
        }
    }

    fn nodes(names: &[(&str, u64)]) -> Vec<(PathBuf, u64)>
    {
        names
            .iter()
            .map(|(n, s)| (PathBuf::from(n), *s))
            .collect()
    }

    #[test]
    fn find_compresses_long_chains()
    {
        let n = 100_000;
        let mut uf = UnionFind::new(n);
        // Link i+1 under i without union-by-size to build one long chain
        for i in 0..n - 1
        {
            uf.parent[i + 1] = i;
        }
        assert_eq!(uf.find(n - 1), 0);
        assert_eq!(uf.parent[n - 1], 0);
        assert_eq!(uf.parent[n / 2], 0);
    }

    #[test]
    fn union_is_transitive()
    {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(0, 1));
        assert!(uf.union(3, 1));
        assert!(!uf.union(0, 3));
        assert_eq!(uf.classes(), vec![vec![0, 1, 3], vec![2], vec![4]]);
    }

    #[test]
    fn clusters_only_multi_member_classes()
    {
        let mut builder = ClusterBuilder::new(nodes(&[
            ("a.js", 100),
            ("b.js", 90),
            ("c.js", 80),
            ("d.js", 70),
        ]));
        builder.add(&dup("c.js", "b.js", 0.9));
        builder.add(&dup("b.js", "a.js", 0.82));

        let mut not_dup = dup("d.js", "a.js", 0.65);
        not_dup.is_duplicate = false;
        builder.add(&not_dup);

        let clusters = builder.finish();
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(
            c.members,
            vec![PathBuf::from("a.js"), PathBuf::from("b.js"), PathBuf::from("c.js")]
        );
        assert_eq!(c.representative(), &PathBuf::from("a.js"));
        assert_eq!(c.stats.member_count, 3);
        assert_eq!(c.stats.total_saved_size, 170);
        assert_eq!(c.stats.max_similarity, 0.9);
        assert_eq!(c.stats.min_similarity, 0.82);
        assert!((c.stats.avg_similarity - 0.86).abs() < 1e-9);
    }

    #[test]
    fn unknown_endpoints_are_ignored()
    {
        let mut builder = ClusterBuilder::new(nodes(&[("a.js", 1), ("b.js", 1)]));
        builder.add(&dup("a.js", "ghost.js", 1.0));
        assert!(
            builder
                .finish()
                .is_empty()
        );
    }
}
