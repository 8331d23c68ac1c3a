//! Catalog construction and reporting against an in-memory object source.

use objstat::api::{AddOutcome, NoopObserver, StatsApi};
use objstat::error::StatsError;
use objstat::source::{
    EmptyBaseline, HashSetBaseline, MemoryObjectSource, ObjectSource, RawObject, RootProvider,
    RootSet,
};
use objstat::store::{Catalog, SledCatalog};
use objstat::types::{ObjectHash, ObjectKind};
use std::cell::Cell;
use tempfile::TempDir;

use super::test_utils::{DIR_MODE, FILE_MODE};

struct Branches(Vec<RootSet>);

impl RootProvider for Branches {
    fn root_sets(&self) -> Result<Vec<RootSet>, StatsError> {
        Ok(self.0.clone())
    }
}

fn branch(name: &str, commits: Vec<ObjectHash>) -> RootSet {
    RootSet {
        name: name.to_string(),
        roots: commits,
        expect: Some(ObjectKind::Commit),
    }
}

/// Serves objects until its budget runs out, then fails the way a broken disk would.
struct InterruptedSource<'a> {
    inner: &'a MemoryObjectSource,
    budget: Cell<usize>,
}

impl ObjectSource for InterruptedSource<'_> {
    fn get(&self, hash: &ObjectHash) -> Result<RawObject, StatsError> {
        if self.budget.get() == 0 {
            return Err(StatsError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "interrupted",
            )));
        }
        self.budget.set(self.budget.get() - 1);
        self.inner.get(hash)
    }
}

#[test]
fn test_shared_subtree_is_fetched_once() {
    let temp = TempDir::new().unwrap();
    let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());

    let mut source = MemoryObjectSource::new();
    let readme = source.add_blob(&b"hello"[..]);
    let docs = source.add_tree(&[(FILE_MODE, "README", &readme)]).unwrap();
    let root_a = source.add_tree(&[(DIR_MODE, "docs", &docs)]).unwrap();
    let extra = source.add_blob(&b"extra"[..]);
    let root_b = source
        .add_tree(&[(DIR_MODE, "docs", &docs), (FILE_MODE, "extra", &extra)])
        .unwrap();
    let first = source.add_commit(&root_a, &[], "first");
    let second = source.add_commit(&root_b, &[&first], "second");

    let provider = Branches(vec![branch("main", vec![second.clone(), first.clone()])]);
    let summary = api.rebuild(&source, &provider, &mut NoopObserver).unwrap();

    // 2 commits, 3 trees, 2 blobs; `docs` and `README` are reached twice but fetched once.
    assert_eq!(summary.stats.discovered, 7);
    assert_eq!(source.fetch_count(), 7);
    assert_eq!(summary.stats.already_present, 1);

    let mut parents = api.parents_of(&docs).unwrap();
    parents.sort();
    let mut expected = vec![root_a, root_b];
    expected.sort();
    assert_eq!(parents, expected);
}

#[test]
fn test_commit_layout_against_baseline() {
    let temp = TempDir::new().unwrap();
    let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());

    let mut source = MemoryObjectSource::new();
    let b1 = source.add_blob(vec![b'a'; 10]);
    let b2 = source.add_blob(vec![b'b'; 20]);
    let tree = source
        .add_tree(&[(FILE_MODE, "b1", &b1), (FILE_MODE, "b2", &b2)])
        .unwrap();
    let commit = source.add_commit(&tree, &[], "initial");

    let provider = Branches(vec![branch("main", vec![commit.clone()])]);
    api.rebuild(&source, &provider, &mut NoopObserver).unwrap();

    let baseline: HashSetBaseline = [b1.clone()].into_iter().collect();
    let report = api.layout(&commit, &baseline, true).unwrap();

    assert_eq!(report.total_bytes, 30);
    assert_eq!(report.min_blob_size, Some(10));
    assert_eq!(report.new_blob_count, 1);
    assert_eq!(report.new_blob_bytes, 20);
    assert_eq!(report.deduplicated_bytes(), 10);
    assert_eq!(report.avg_new_blob_size(), Some(20.0));
    assert_eq!(report.new_tree_count, 1);

    // The commit's tree appears as a marker, then its blobs one level down.
    let kinds: Vec<(ObjectKind, usize)> = report
        .rows
        .iter()
        .map(|row| (row.entry.kind, row.entry.depth))
        .collect();
    assert_eq!(
        kinds,
        vec![(ObjectKind::Tree, 0), (ObjectKind::Blob, 1), (ObjectKind::Blob, 1)]
    );
    assert_eq!(report.rows.last().unwrap().entry.cumulative, 30);
}

#[test]
fn test_add_is_incremental_and_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());

    let mut source = MemoryObjectSource::new();
    let shared = source.add_blob(&b"shared"[..]);
    let first = source.add_tree(&[(FILE_MODE, "s", &shared)]).unwrap();
    let own = source.add_blob(&b"own"[..]);
    let second = source
        .add_tree(&[(FILE_MODE, "s", &shared), (FILE_MODE, "o", &own)])
        .unwrap();

    api.add(&source, &first, &mut NoopObserver).unwrap();
    source.reset_fetch_count();

    match api.add(&source, &second, &mut NoopObserver).unwrap() {
        AddOutcome::Added { stats, .. } => {
            assert_eq!(stats.discovered, 2);
            assert_eq!(stats.already_present, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(source.fetch_count(), 2, "the shared blob must not be fetched again");

    source.reset_fetch_count();
    let again = api.add(&source, &second, &mut NoopObserver).unwrap();
    assert!(matches!(again, AddOutcome::AlreadyPresent { .. }));
    assert_eq!(source.fetch_count(), 0);
}

#[test]
fn test_interrupted_rebuild_keeps_previous_catalog() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog");

    let mut source = MemoryObjectSource::new();
    let blob = source.add_blob(&b"v1"[..]);
    let tree = source.add_tree(&[(FILE_MODE, "f", &blob)]).unwrap();
    let commit = source.add_commit(&tree, &[], "v1");
    let provider = Branches(vec![branch("main", vec![commit.clone()])]);

    let before = {
        let mut api = StatsApi::new(SledCatalog::open(&path).unwrap());
        api.rebuild(&source, &provider, &mut NoopObserver).unwrap();
        api.status().unwrap()
    };

    {
        let mut api = StatsApi::new(SledCatalog::open(&path).unwrap());
        let failing = InterruptedSource {
            inner: &source,
            budget: Cell::new(1),
        };
        let err = api.rebuild(&failing, &provider, &mut NoopObserver).unwrap_err();
        assert!(matches!(err, StatsError::Io(_)));

        // The failed run is invisible even to the instance that attempted it.
        assert_eq!(api.status().unwrap(), before);
        assert!(api.catalog().lookup(&blob).unwrap().is_some());
    }

    let reopened = StatsApi::new(SledCatalog::open_existing(&path).unwrap());
    assert_eq!(reopened.status().unwrap(), before);
    let report = reopened.layout(&tree, &EmptyBaseline, false).unwrap();
    assert_eq!(report.total_bytes, 2);
}

#[test]
fn test_rebuild_twice_yields_same_catalog() {
    let temp = TempDir::new().unwrap();
    let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());

    let mut source = MemoryObjectSource::new();
    let a = source.add_blob(&b"a"[..]);
    let b = source.add_blob(&b"bb"[..]);
    let tree = source
        .add_tree(&[(FILE_MODE, "a", &a), (FILE_MODE, "b", &b)])
        .unwrap();
    let commit = source.add_commit(&tree, &[], "c");
    let provider = Branches(vec![branch("main", vec![commit])]);

    let first = api.rebuild(&source, &provider, &mut NoopObserver).unwrap();
    let info_first = api.status().unwrap();
    let sizes_first = api.subtree_sizes().unwrap();

    let second = api.rebuild(&source, &provider, &mut NoopObserver).unwrap();
    let info_second = api.status().unwrap();

    assert_eq!(first.stats, second.stats);
    assert!(second.generation > first.generation);
    assert_eq!(info_first.objects, info_second.objects);
    assert_eq!(info_first.edges, info_second.edges);
    assert_eq!(sizes_first, api.subtree_sizes().unwrap());
}

#[test]
fn test_missing_blob_only_skips_its_branch() {
    let temp = TempDir::new().unwrap();
    let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());

    let mut source = MemoryObjectSource::new();
    let present = source.add_blob(&b"present"[..]);
    let missing = ObjectHash::from_bytes(&[0xee; 20]);
    let tree = source
        .add_tree(&[(FILE_MODE, "gone", &missing), (FILE_MODE, "here", &present)])
        .unwrap();
    let commit = source.add_commit(&tree, &[], "partial");

    let provider = Branches(vec![branch("main", vec![commit])]);
    let summary = api.rebuild(&source, &provider, &mut NoopObserver).unwrap();
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(summary.stats.discovered, 3);

    let report = api.layout(&tree, &EmptyBaseline, false).unwrap();
    assert_eq!(report.total_bytes, 7);
}
