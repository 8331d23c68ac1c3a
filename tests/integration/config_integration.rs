//! Configuration layering as seen by the command layer.

use objstat::cli::{Commands, RunContext};
use objstat::config::{BaselineSource, ConfigLoader};
use objstat::error::StatsError;

use super::test_utils::{RepoFixture, FILE_MODE};

#[test]
fn test_repository_file_is_picked_up() {
    let repo = RepoFixture::new();
    std::fs::write(
        repo.git_dir.join("objstat.toml"),
        "[storage]\ncatalog_path = \"stats-db\"\n\n[baseline]\nsource = \"none\"\n\n[progress]\ninterval_ms = 250\n",
    )
    .unwrap();

    let config = ConfigLoader::load(&repo.git_dir).unwrap();
    assert_eq!(config.baseline.source, BaselineSource::Disabled);
    assert_eq!(config.progress.interval_ms, 250);
    assert!(config.progress.enabled, "unset keys keep their defaults");

    let ctx = RunContext::new(Some(repo.git_dir.clone()), None, None, true).unwrap();
    assert!(ctx.catalog_path().ends_with("stats-db"));
    assert!(ctx.catalog_path().starts_with(dunce::canonicalize(&repo.git_dir).unwrap()));
}

#[test]
fn test_disabled_baseline_counts_everything_as_new() {
    let mut repo = RepoFixture::new();
    let blob = repo.blob(&[b'z'; 12]);
    let tree = repo.tree(&[(FILE_MODE, "z", &blob)]);
    let commit = repo.commit(&tree, &[], "z");
    repo.set_ref("refs/heads/main", &commit);
    repo.pack_index("pack-all", &[blob.clone(), tree.clone(), commit.clone()]);

    let config = repo.temp.path().join("no-baseline.toml");
    std::fs::write(&config, "[baseline]\nsource = \"none\"\n").unwrap();
    let ctx = RunContext::new(
        Some(repo.git_dir.clone()),
        Some(config),
        Some(repo.catalog_path()),
        true,
    )
    .unwrap();

    ctx.execute(&Commands::Rebuild {
        yes: true,
        format: "text".to_string(),
    })
    .unwrap();
    let layout: serde_json::Value = serde_json::from_str(
        &ctx.execute(&Commands::Layout {
            hash: tree.to_string(),
            details: false,
            no_baseline: false,
            baseline_file: None,
            format: "json".to_string(),
        })
        .unwrap(),
    )
    .unwrap();
    assert_eq!(layout["blobs"]["new_bytes"], 12);
}

#[test]
fn test_invalid_config_is_rejected() {
    let repo = RepoFixture::new();
    let config = repo.temp.path().join("bad.toml");
    std::fs::write(&config, "[baseline]\nsource = \"file\"\n").unwrap();

    let result = RunContext::new(Some(repo.git_dir.clone()), Some(config), None, true);
    match result {
        Err(StatsError::ConfigError(message)) => assert!(message.contains("baseline.file")),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("config without baseline.file must be rejected"),
    }
}

#[test]
fn test_config_command_shows_effective_values() {
    let repo = RepoFixture::new();
    let ctx = RunContext::new(
        Some(repo.git_dir.clone()),
        Some(repo.config_path()),
        Some(repo.catalog_path()),
        true,
    )
    .unwrap();

    let shown = ctx
        .execute(&Commands::Config {
            format: "toml".to_string(),
        })
        .unwrap();
    assert!(shown.contains("enabled = false"));
    assert!(shown.contains("source = \"pack\""));
}
