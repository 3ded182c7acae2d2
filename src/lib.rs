//! **jsdedup** - Parallel near-duplicate detection and clustering for decoded JavaScript
//!
//! Exact copies are grouped by normalized-content digest; one representative
//! per digest is then scored pairwise (content alignment, structural
//! fingerprint, identifier overlap) and near-duplicates are clustered
//! transitively. The input tree is partitioned into unique, exact-duplicate,
//! similar-group and merged buckets alongside a JSON report.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Error taxonomy shared by every stage
pub mod error;

/// Detection pipeline
pub mod core {
    /// Pattern-based feature extraction and content digests
    pub mod features;
    pub use features::{ContentDigest, FeatureExtractor, FeatureRecord, StructureKind};

    /// Component scores, weights and pre-screens for one pair
    pub mod similarity;
    pub use similarity::{SimilarityScore, SimilarityScorer};

    /// Digest-keyed exact-duplicate grouping
    pub mod exact;
    pub use exact::{ExactDuplicateGroup, ExactDuplicateIndex};

    /// Union-find clustering of near-duplicate pairs
    pub mod cluster;
    pub use cluster::{Cluster, ClusterBuilder, UnionFind};

    /// Pool and thread executors behind one interface
    pub mod executor;
    pub use executor::{Executor, ExecutorPreference, ParallelExecutor};

    /// Stage-by-stage coordinator
    pub mod engine;
    pub use engine::{Analysis, CancellationToken, DedupEngine, EngineConfig, run as dedupe_run};

    /// Bucket assignment and output copies
    pub mod partition;
    pub use partition::{OutputPartitioner, Partition};

    /// Run summary and JSON report
    pub mod report;
    pub use report::{Report, RunSummary};

    /// `inspect` and `compare` diagnostics
    pub mod inspect;
    pub use inspect::{compare_run, inspect_run};
}

/// Infrastructure - Configuration, I/O, walking and logging
pub mod infra {
    /// Layered configuration (file, environment) with validation
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped reads for large files and text decoding
    pub mod io;
    pub use io::{Document, FileContent, read_document, read_file_smart};

    /// Ignore-aware directory walking with extension filtering
    pub mod walk;
    pub use walk::FileWalker;

    /// Tracing subscriber setup
    pub mod logging;
}

// Re-exports for the binary
pub use cli::{AppContext, Cli, Commands};
pub use core::{DedupEngine, EngineConfig, RunSummary, compare_run, dedupe_run, inspect_run};
pub use error::{DedupError, Result};
pub use infra::{Config, FileWalker, load_config};
