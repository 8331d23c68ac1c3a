//! Command routing through `RunContext`, output in json for stable assertions.

use objstat::cli::{Commands, RunContext};
use objstat::error::StatsError;

use super::test_utils::{RepoFixture, DIR_MODE, FILE_MODE};

fn json(output: &str) -> serde_json::Value {
    serde_json::from_str(output).unwrap()
}

fn context(repo: &RepoFixture) -> RunContext {
    RunContext::new(
        Some(repo.git_dir.clone()),
        Some(repo.config_path()),
        Some(repo.catalog_path()),
        true,
    )
    .unwrap()
}

fn rebuild(ctx: &RunContext) -> serde_json::Value {
    json(
        &ctx.execute(&Commands::Rebuild {
            yes: true,
            format: "json".to_string(),
        })
        .unwrap(),
    )
}

#[test]
fn test_rebuild_layout_and_queries() {
    let mut repo = RepoFixture::new();
    let packed = repo.blob(&[b'p'; 10]);
    let fresh = repo.blob(&[b'f'; 20]);
    let sub = repo.tree(&[(FILE_MODE, "fresh", &fresh)]);
    let root = repo.tree(&[(FILE_MODE, "packed", &packed), (DIR_MODE, "sub", &sub)]);
    let commit = repo.commit(&root, &[], "initial");
    repo.set_ref("refs/heads/main", &commit);
    repo.pack_index("pack-old", &[packed.clone()]);

    let ctx = context(&repo);
    let summary = rebuild(&ctx);
    assert_eq!(summary["stats"]["discovered"], 5);
    assert_eq!(summary["root_sets"], 1);

    let layout = json(
        &ctx.execute(&Commands::Layout {
            hash: root.to_string(),
            details: false,
            no_baseline: false,
            baseline_file: None,
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(layout["blobs"]["total_bytes"], 30);
    assert_eq!(layout["blobs"]["new_bytes"], 20);
    assert_eq!(layout["blobs"]["deduplicated_bytes"], 10);
    assert_eq!(layout["blobs"]["min_size"], 10);
    assert_eq!(layout["trees"]["new_count"], 1);

    let unbaselined = json(
        &ctx.execute(&Commands::Layout {
            hash: root.to_string(),
            details: true,
            no_baseline: true,
            baseline_file: None,
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(unbaselined["blobs"]["new_bytes"], 30);
    assert_eq!(unbaselined["rows"].as_array().unwrap().len(), 3);

    let parents = json(
        &ctx.execute(&Commands::Parents {
            hash: sub.to_string(),
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(parents["parents"][0], root.to_string());

    let subtrees = json(
        &ctx.execute(&Commands::Subtrees {
            top: Some(1),
            histogram: false,
            min_children: None,
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(subtrees["total"], 1);
    assert_eq!(subtrees["subtrees"][0]["hash"], root.to_string());
    assert_eq!(subtrees["subtrees"][0]["children"], 2);

    // commit -> root, root -> {packed, sub}, sub -> fresh
    let histogram = json(
        &ctx.execute(&Commands::Subtrees {
            top: None,
            histogram: true,
            min_children: None,
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(histogram["parents"], 3);
    assert_eq!(histogram["histogram"][0]["children"], 1);
    assert_eq!(histogram["histogram"][0]["parents"], 2);
    assert_eq!(histogram["histogram"][1]["children"], 2);

    let heavy = ctx
        .execute(&Commands::Subtrees {
            top: None,
            histogram: false,
            min_children: Some(2),
            format: "text".to_string(),
        })
        .unwrap();
    assert_eq!(heavy, format!("Trees with at least 2 children:\n{} 2\n", root));

    let status = json(
        &ctx.execute(&Commands::Status {
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(status["objects"], 5);
    assert!(status["generation"].is_u64());
}

#[test]
fn test_baseline_file_overrides_pack_indexes() {
    let mut repo = RepoFixture::new();
    let a = repo.blob(&[b'a'; 5]);
    let b = repo.blob(&[b'b'; 7]);
    let root = repo.tree(&[(FILE_MODE, "a", &a), (FILE_MODE, "b", &b)]);
    let commit = repo.commit(&root, &[], "c");
    repo.set_ref("refs/heads/main", &commit);

    let list = repo.temp.path().join("known.txt");
    std::fs::write(&list, format!("# already stored\n{}\n", b)).unwrap();

    let ctx = context(&repo);
    rebuild(&ctx);
    let layout = json(
        &ctx.execute(&Commands::Layout {
            hash: root.to_string(),
            details: false,
            no_baseline: false,
            baseline_file: Some(list),
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(layout["blobs"]["new_bytes"], 5);
    assert_eq!(layout["blobs"]["deduplicated_bytes"], 7);
}

#[test]
fn test_add_reports_already_present() {
    let mut repo = RepoFixture::new();
    let blob = repo.blob(b"data");
    let tree = repo.tree(&[(FILE_MODE, "data", &blob)]);

    let ctx = context(&repo);
    let added = json(
        &ctx.execute(&Commands::Add {
            hash: tree.to_string(),
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(added["outcome"], "added");
    assert_eq!(added["stats"]["discovered"], 2);

    let again = ctx
        .execute(&Commands::Add {
            hash: tree.to_string(),
            format: "text".to_string(),
        })
        .unwrap();
    assert_eq!(again, format!("{} is already in the catalog.", tree));
}

#[test]
fn test_empty_repository_fails_without_publishing() {
    let repo = RepoFixture::new();
    let ctx = context(&repo);

    let err = ctx
        .execute(&Commands::Rebuild {
            yes: true,
            format: "text".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, StatsError::NoReachableObjects));

    let layout = ctx.execute(&Commands::Layout {
        hash: "ab".repeat(20),
        details: false,
        no_baseline: true,
        baseline_file: None,
        format: "text".to_string(),
    });
    assert!(matches!(layout, Err(StatsError::DatabaseMissing(_))));
}

#[test]
fn test_unknown_hash_after_rebuild() {
    let mut repo = RepoFixture::new();
    let blob = repo.blob(b"x");
    let tree = repo.tree(&[(FILE_MODE, "x", &blob)]);
    let commit = repo.commit(&tree, &[], "x");
    repo.set_ref("refs/heads/main", &commit);

    let ctx = context(&repo);
    rebuild(&ctx);
    let err = ctx
        .execute(&Commands::Parents {
            hash: "cd".repeat(20),
            format: "text".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, StatsError::HashNotFound(_)));
    assert!(objstat::cli::map_error(&err).contains("objstat add"));
}
