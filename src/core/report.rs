//! Run summary and the JSON similarity report.

use std::path::{Component, Path};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::cluster::ClusterStats;
use crate::core::engine::{Analysis, SkippedFile};
use crate::core::executor::{Executor, ParallelExecutor};
use crate::core::partition::{Partition, WriteFailure};
use crate::error::DedupError;

/// Aggregate counts for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary
{
    /// Documents read successfully
    pub total_files: usize,
    /// Exact groups written to their own `exact_group_<n>` folder
    pub exact_duplicate_groups: usize,
    /// Exact groups folded into a near-duplicate bucket
    pub absorbed_exact_groups: usize,
    pub similar_groups: usize,
    /// Sum of (size - 1) over foldered exact groups
    pub total_exact_duplicates: usize,
    /// Sum of (size - 1) over near-duplicate clusters
    pub total_similar_files: usize,
    /// Documents placed in `unique/`
    pub unique_files: usize,
    pub processing_time_seconds: f64,
    pub files_per_second: f64,
    pub discovered_files: usize,
    pub skipped_files: usize,
    pub merged_files: usize,
    pub pairs_compared: usize,
    pub pairs_scored: usize,
    pub scoring_failures: usize,
    pub write_failures: usize,
    pub executor: String,
    pub workers: usize,
}

impl RunSummary
{
    pub fn build(
        analysis: &Analysis,
        partition: &Partition,
        write_failures: usize,
        executor: &Executor,
        elapsed: Duration,
    ) -> Self
    {
        let secs = elapsed.as_secs_f64();
        let total_files = analysis
            .documents
            .len();

        Self {
            total_files,
            exact_duplicate_groups: partition
                .exact
                .len(),
            absorbed_exact_groups: partition
                .absorbed
                .iter()
                .map(Vec::len)
                .sum(),
            similar_groups: analysis
                .clusters
                .len(),
            total_exact_duplicates: partition
                .exact
                .iter()
                .map(|g| g.len() - 1)
                .sum(),
            total_similar_files: analysis
                .clusters
                .iter()
                .map(|c| c.members.len() - 1)
                .sum(),
            unique_files: partition
                .unique
                .len(),
            processing_time_seconds: secs,
            files_per_second: if secs > 0.0 { total_files as f64 / secs } else { 0.0 },
            discovered_files: analysis.discovered,
            skipped_files: analysis
                .skipped
                .len(),
            merged_files: partition
                .merged()
                .len(),
            pairs_compared: analysis.pairs_compared,
            pairs_scored: analysis.pairs_scored,
            scoring_failures: analysis.scoring_failures,
            write_failures,
            executor: executor
                .name()
                .to_string(),
            workers: executor.workers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityDetail
{
    pub file1: String,
    pub file2: String,
    pub overall_similarity: f64,
    pub content_similarity: f64,
    pub structural_similarity: f64,
    pub function_similarity: f64,
    pub variable_similarity: f64,
    pub is_duplicate: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDetail
{
    pub representative: String,
    pub members: Vec<String>,
    /// Exact groups copied into this cluster's folder
    pub absorbed_exact_groups: Vec<Vec<String>>,
    #[serde(flatten)]
    pub stats: ClusterStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry
{
    pub path: String,
    pub reason: String,
}

/// The `detailed_similarity_report.json` document
#[derive(Debug, Clone, Serialize)]
pub struct Report
{
    pub generated_at: DateTime<Utc>,
    pub summary: RunSummary,
    /// `exact_duplicate_groups[n]` lists `exact_group_<n + 1>`
    pub exact_duplicate_groups: Vec<Vec<String>>,
    pub similar_groups: Vec<Vec<String>>,
    pub similarity_details: Vec<SimilarityDetail>,
    pub cluster_details: Vec<ClusterDetail>,
    pub skipped_files: Vec<SkippedEntry>,
    pub write_failures: Vec<WriteFailure>,
}

impl Report
{
    pub fn build(
        analysis: &Analysis,
        partition: &Partition,
        summary: RunSummary,
        write_failures: Vec<WriteFailure>,
    ) -> Self
    {
        let labels = |paths: &[std::path::PathBuf]| -> Vec<String> {
            paths
                .iter()
                .map(|p| path_label(p))
                .collect()
        };
        let doc_labels = |indices: &[usize]| -> Vec<String> {
            indices
                .iter()
                .map(|&i| path_label(&analysis.documents[i].relative))
                .collect()
        };

        Self {
            generated_at: Utc::now(),
            summary,
            exact_duplicate_groups: partition
                .exact
                .iter()
                .map(|g| doc_labels(g.as_slice()))
                .collect(),
            similar_groups: analysis
                .clusters
                .iter()
                .map(|c| labels(&c.members))
                .collect(),
            similarity_details: analysis
                .duplicate_scores
                .iter()
                .map(|s| SimilarityDetail {
                    file1: path_label(&s.file1),
                    file2: path_label(&s.file2),
                    overall_similarity: s.overall,
                    content_similarity: s.content,
                    structural_similarity: s.structural,
                    function_similarity: s.function,
                    variable_similarity: s.variable,
                    is_duplicate: s.is_duplicate,
                    reasons: s
                        .reasons
                        .clone(),
                })
                .collect(),
            cluster_details: analysis
                .clusters
                .iter()
                .zip(&partition.absorbed)
                .map(|(c, absorbed)| ClusterDetail {
                    representative: path_label(c.representative()),
                    members: labels(&c.members),
                    absorbed_exact_groups: absorbed
                        .iter()
                        .map(|g| doc_labels(g.as_slice()))
                        .collect(),
                    stats: c
                        .stats
                        .clone(),
                })
                .collect(),
            skipped_files: analysis
                .skipped
                .iter()
                .map(|SkippedFile { path, reason }| SkippedEntry {
                    path: path_label(path),
                    reason: reason.clone(),
                })
                .collect(),
            write_failures,
        }
    }

    /// Serialize as pretty JSON to `path`
    pub fn write_to(
        &self,
        path: &Path,
    ) -> Result<(), WriteFailure>
    {
        let json = serde_json::to_string_pretty(self).map_err(|e| WriteFailure {
            path: path.to_path_buf(),
            reason: format!("failed to serialize report: {e}"),
        })?;
        std::fs::write(path, json).map_err(|source| {
            WriteFailure::from(DedupError::OutputWrite { path: path.to_path_buf(), source })
        })
    }
}

/// Relative path with `/` separators on every platform
pub fn path_label(path: &Path) -> String
{
    path.components()
        .filter_map(|c| match c
        {
            Component::Normal(part) => Some(
                part.to_string_lossy()
                    .into_owned(),
            ),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
