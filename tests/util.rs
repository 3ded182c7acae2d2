//! Shared test utilities for integration tests
//!
//! Fixture corpora and helpers used across multiple test files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use jsdedup::{DedupEngine, EngineConfig};
use jsdedup::core::ExecutorPreference;

/// A small render function with three locals
pub const ORIGINAL: &str = "function render(list) { var total = 0; var index = 0; var label = 'x';\n\
     for (index = 0; index < list.length; index++) { if (list[index]) { total += 1; } }\n\
     return { total: total, label: label }; }\n";

/// `ORIGINAL` with one local renamed
pub const RENAMED: &str = "function render(list) { var sum = 0; var index = 0; var label = 'x';\n\
     for (index = 0; index < list.length; index++) { if (list[index]) { sum += 1; } }\n\
     return { total: sum, label: label }; }\n";

/// Mutually unrelated sources: disjoint function and variable names,
/// different control flow
pub const UNRELATED: [&str; 5] = [
    "function alpha() { var one = [1, 2, 3]; return one.length; }\n",
    "function bravo(q) { let zed = q * 7; while (zed) { zed--; } return zed; }\n",
    "function charlie(s) { const parts = s.split(','); try { JSON.parse(parts[0]); } catch (e) {} }\n",
    "function delta(n) { switch (n) { case 1: return 'a'; default: return 'b'; } }\n",
    "class Echo { constructor(w) { this.width = w; } } function foxtrot() { let inst = new Echo(2); return inst; }\n",
];

/// Write `files` (relative path, contents) under a fresh temp dir
pub fn corpus(files: &[(&str, &[u8])]) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    for (path, bytes) in files
    {
        tmp.child(path)
            .write_binary(bytes)
            .expect("write fixture");
    }
    tmp
}

/// Scenario 1 corpus: a.js and b.js identical, c.js a renamed-local copy
pub fn near_duplicate_corpus() -> assert_fs::TempDir
{
    corpus(&[
        ("a.js", ORIGINAL.as_bytes()),
        ("b.js", ORIGINAL.as_bytes()),
        ("c.js", RENAMED.as_bytes()),
        ("other/u.js", UNRELATED[3].as_bytes()),
    ])
}

pub fn engine_with(
    threshold: f64,
    executor: ExecutorPreference,
    workers: usize,
) -> DedupEngine
{
    DedupEngine::new(EngineConfig {
        similarity_threshold: threshold,
        executor,
        max_workers: Some(workers),
        ..EngineConfig::default()
    })
    .expect("engine")
}

pub fn engine() -> DedupEngine
{
    engine_with(0.8, ExecutorPreference::Auto, 4)
}

/// File names directly inside `dir`, sorted
pub fn names_in(dir: &Path) -> Vec<String>
{
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| {
            e.expect("entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// Every regular file beneath `dir`, recursively
pub fn files_under(dir: &Path) -> Vec<PathBuf>
{
    let mut out = Vec::new();
    if !dir.exists()
    {
        return out;
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop()
    {
        for entry in std::fs::read_dir(&d).expect("read_dir")
        {
            let path = entry
                .expect("entry")
                .path();
            if path.is_dir()
            {
                stack.push(path);
            }
            else
            {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

pub fn read_report(output: &Path) -> serde_json::Value
{
    let text = std::fs::read_to_string(output.join("detailed_similarity_report.json"))
        .expect("report exists");
    serde_json::from_str(&text).expect("report is JSON")
}
