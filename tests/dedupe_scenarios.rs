//! End-to-end runs of the engine over small on-disk corpora.

mod util;

use std::path::PathBuf;

use assert_fs::prelude::*;
use jsdedup::DedupError;
use jsdedup::core::ExecutorPreference;
use util::*;

#[test]
fn exact_copies_and_renamed_locals_form_one_similar_group()
{
    let input = near_duplicate_corpus();
    let out = assert_fs::TempDir::new().unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();

    assert_eq!(summary.total_files, 4);
    assert_eq!(summary.exact_duplicate_groups, 0);
    assert_eq!(summary.absorbed_exact_groups, 1);
    assert_eq!(summary.total_exact_duplicates, 0);
    assert_eq!(summary.similar_groups, 1);
    assert_eq!(summary.total_similar_files, 1);
    assert_eq!(summary.unique_files, 1);
    assert_eq!(summary.write_failures, 0);

    let report = read_report(out.path());
    assert_eq!(report["exact_duplicate_groups"], serde_json::json!([]));
    assert_eq!(report["similar_groups"], serde_json::json!([["a.js", "c.js"]]));
    assert_eq!(
        report["cluster_details"][0]["absorbed_exact_groups"],
        serde_json::json!([["a.js", "b.js"]])
    );

    let detail = &report["similarity_details"][0];
    assert_eq!(detail["file1"], "a.js");
    assert_eq!(detail["file2"], "c.js");
    assert_eq!(detail["is_duplicate"], true);
    assert!(detail["overall_similarity"].as_f64().unwrap() >= 0.8);

    // The exact copy follows its representative into the similar bucket
    assert_eq!(
        names_in(&out.path().join("similar_groups/similar_group_1")),
        vec!["a.js", "b.js", "c.js"]
    );
    assert_eq!(names_in(&out.path().join("unique")), vec!["other__u.js"]);
    assert_eq!(names_in(&out.path().join("merged")), vec!["a.js", "other__u.js"]);
    assert!(!out.path().join("exact_duplicates").exists());
}

#[test]
fn exact_group_without_near_duplicates_gets_its_own_bucket()
{
    let input = corpus(&[
        ("x/one.js", UNRELATED[0].as_bytes()),
        ("y/one.js", UNRELATED[0].as_bytes()),
        ("two.js", UNRELATED[1].as_bytes()),
    ]);
    let out = assert_fs::TempDir::new().unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();
    assert_eq!(summary.exact_duplicate_groups, 1);
    assert_eq!(summary.similar_groups, 0);
    assert_eq!(summary.unique_files, 1);
    assert_eq!(summary.merged_files, 2);

    assert_eq!(
        names_in(&out.path().join("exact_duplicates/exact_group_1")),
        vec!["x__one.js", "y__one.js"]
    );
    assert_eq!(names_in(&out.path().join("merged")), vec!["two.js", "x__one.js"]);
}

#[test]
fn exact_groups_are_numbered_by_their_folders()
{
    let input = corpus(&[
        ("a.js", ORIGINAL.as_bytes()),
        ("b.js", ORIGINAL.as_bytes()),
        ("c.js", RENAMED.as_bytes()),
        ("x.js", UNRELATED[0].as_bytes()),
        ("y.js", UNRELATED[0].as_bytes()),
    ]);
    let out = assert_fs::TempDir::new().unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();
    let report = read_report(out.path());

    // {a, b} rides along with c into the similar bucket; only {x, y} gets a folder
    let folders = names_in(&out.path().join("exact_duplicates"));
    assert_eq!(folders, vec!["exact_group_1"]);
    assert_eq!(summary.exact_duplicate_groups, 1);
    assert_eq!(summary.absorbed_exact_groups, 1);
    assert_eq!(summary.total_exact_duplicates, 1);
    assert_eq!(report["summary"]["exact_duplicate_groups"], 1);
    assert_eq!(report["exact_duplicate_groups"], serde_json::json!([["x.js", "y.js"]]));
    assert_eq!(
        names_in(&out.path().join("exact_duplicates/exact_group_1")),
        vec!["x.js", "y.js"]
    );

    assert_eq!(
        report["cluster_details"][0]["absorbed_exact_groups"],
        serde_json::json!([["a.js", "b.js"]])
    );
    assert_eq!(
        names_in(&out.path().join("similar_groups/similar_group_1")),
        vec!["a.js", "b.js", "c.js"]
    );
}

#[test]
fn blocked_destination_is_reported_not_fatal()
{
    let input = near_duplicate_corpus();
    let out = assert_fs::TempDir::new().unwrap();
    // A plain file where the unique/ folder should go
    out.child("unique")
        .write_str("in the way")
        .unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();
    assert!(summary.write_failures > 0);

    let report = read_report(out.path());
    let failures = report["write_failures"]
        .as_array()
        .unwrap();
    assert!(!failures.is_empty());
    assert!(failures.iter().all(|f| {
        f["path"]
            .as_str()
            .unwrap()
            .ends_with("unique")
    }));
    assert_eq!(report["summary"]["write_failures"], failures.len());

    // Every other bucket is still written
    assert_eq!(names_in(&out.path().join("merged")), vec!["a.js", "other__u.js"]);
    assert_eq!(
        names_in(&out.path().join("similar_groups/similar_group_1")),
        vec!["a.js", "b.js", "c.js"]
    );
}

#[test]
fn size_mismatch_produces_no_score()
{
    let big = format!("var e = 1;{}", " e = e + 1;".repeat(909));
    let input = corpus(&[("d.js", &b"var d = 1;"[..]), ("e.js", big.as_bytes())]);

    let analysis = engine()
        .analyze(input.path())
        .unwrap();
    assert_eq!(analysis.pairs_compared, 1);
    assert_eq!(analysis.pairs_scored, 0);
    assert!(
        analysis
            .duplicate_scores
            .is_empty()
    );
}

#[test]
fn unrelated_corpus_is_all_unique()
{
    let files: Vec<(String, &[u8])> = UNRELATED
        .iter()
        .enumerate()
        .map(|(i, src)| (format!("f{i}.js"), src.as_bytes()))
        .collect();
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(p, b)| (p.as_str(), *b))
        .collect();
    let input = corpus(&refs);
    let out = assert_fs::TempDir::new().unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();
    assert_eq!(summary.exact_duplicate_groups, 0);
    assert_eq!(summary.similar_groups, 0);
    assert_eq!(summary.unique_files, 5);
    assert_eq!(names_in(&out.path().join("merged")).len(), 5);
}

#[test]
fn binary_file_is_skipped_without_aborting()
{
    let input = corpus(&[
        ("ok1.js", UNRELATED[0].as_bytes()),
        ("ok2.js", UNRELATED[1].as_bytes()),
        ("ok3.js", UNRELATED[2].as_bytes()),
        ("blob.js", &[0x7f, 0x45, 0x4c, 0x46, 0x00, 0x01][..]),
    ]);
    let out = assert_fs::TempDir::new().unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();
    assert_eq!(summary.discovered_files, 4);
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.skipped_files, 1);

    let report = read_report(out.path());
    assert_eq!(report["skipped_files"][0]["path"], "blob.js");
    assert!(
        !files_under(out.path())
            .iter()
            .any(|p| p.ends_with("blob.js"))
    );
}

#[test]
fn every_document_lands_in_exactly_one_bucket()
{
    let input = corpus(&[
        ("a.js", ORIGINAL.as_bytes()),
        ("b.js", ORIGINAL.as_bytes()),
        ("c.js", RENAMED.as_bytes()),
        ("d.js", UNRELATED[0].as_bytes()),
        ("e.js", UNRELATED[0].as_bytes()),
        ("f.js", UNRELATED[1].as_bytes()),
        ("g/h.js", UNRELATED[2].as_bytes()),
    ]);
    let out = assert_fs::TempDir::new().unwrap();

    let summary = engine()
        .run(input.path(), out.path())
        .unwrap();

    let bucketed: usize = ["unique", "exact_duplicates", "similar_groups"]
        .iter()
        .map(|b| files_under(&out.path().join(b)).len())
        .sum();
    assert_eq!(bucketed, summary.total_files);
    assert_eq!(bucketed, 7);
}

#[test]
fn output_is_identical_across_executors_and_worker_counts()
{
    let input = near_duplicate_corpus();

    let runs: Vec<serde_json::Value> = [
        (ExecutorPreference::Pool, 1),
        (ExecutorPreference::Pool, 4),
        (ExecutorPreference::Threads, 3),
    ]
    .into_iter()
    .map(|(executor, workers)| {
        let out = assert_fs::TempDir::new().unwrap();
        engine_with(0.8, executor, workers)
            .run(input.path(), out.path())
            .unwrap();
        let report = read_report(out.path());
        serde_json::json!({
            "exact": report["exact_duplicate_groups"],
            "similar": report["similar_groups"],
            "details": report["similarity_details"],
            "clusters": report["cluster_details"],
        })
    })
    .collect();

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn missing_input_is_fatal_and_writes_nothing()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    let out = tmp.child("out");

    let err = engine()
        .run(&tmp.path().join("absent"), out.path())
        .unwrap_err();
    assert!(matches!(err, DedupError::Input { .. }));
    assert!(!out.path().exists());
}

#[test]
fn output_inside_input_is_not_reingested()
{
    let input = near_duplicate_corpus();
    let out: PathBuf = input
        .path()
        .join("deduped");

    let first = engine()
        .run(input.path(), &out)
        .unwrap();
    let second = engine()
        .run(input.path(), &out)
        .unwrap();
    assert_eq!(first.total_files, second.total_files);
    assert_eq!(second.discovered_files, 4);
}

#[test]
fn cancelled_run_reports_cancellation()
{
    let input = near_duplicate_corpus();
    let out = assert_fs::TempDir::new().unwrap();

    let engine = engine();
    engine
        .cancellation_token()
        .cancel();
    assert!(matches!(
        engine
            .run(input.path(), out.path())
            .unwrap_err(),
        DedupError::Cancelled
    ));
    assert!(!out.path().join("merged").exists());
}

#[test]
fn report_carries_every_section()
{
    let input = near_duplicate_corpus();
    let out = assert_fs::TempDir::new().unwrap();
    engine()
        .run(input.path(), out.path())
        .unwrap();

    let report = read_report(out.path());
    for key in [
        "generated_at",
        "summary",
        "exact_duplicate_groups",
        "similar_groups",
        "similarity_details",
        "cluster_details",
        "skipped_files",
        "write_failures",
    ]
    {
        assert!(report.get(key).is_some(), "missing {key}");
    }

    let cluster = &report["cluster_details"][0];
    assert_eq!(cluster["representative"], "a.js");
    assert_eq!(cluster["member_count"], 2);
    assert!(cluster["avg_similarity"].as_f64().unwrap() >= 0.8);
    assert_eq!(cluster["total_saved_size"], RENAMED.len() as u64);
}

#[test]
fn extension_filter_is_case_insensitive_and_exclusive()
{
    let input = corpus(&[
        ("upper.JS", UNRELATED[0].as_bytes()),
        ("lower.js", UNRELATED[1].as_bytes()),
        ("notes.txt", UNRELATED[2].as_bytes()),
    ]);
    let analysis = engine()
        .analyze(input.path())
        .unwrap();
    assert_eq!(analysis.discovered, 2);
}
