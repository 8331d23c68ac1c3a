//! Property-based tests over randomly shaped object graphs.

use objstat::api::{NoopObserver, StatsApi};
use objstat::source::{EmptyBaseline, MemoryObjectSource};
use objstat::store::SledCatalog;
use objstat::types::ObjectHash;
use proptest::prelude::*;
use proptest::sample::Index;
use std::collections::{HashMap, HashSet};
use tempfile::TempDir;

use super::test_utils::{DIR_MODE, FILE_MODE};

struct Graph {
    source: MemoryObjectSource,
    root: ObjectHash,
    children: HashMap<ObjectHash, Vec<ObjectHash>>,
    sizes: HashMap<ObjectHash, u64>,
}

/// Blobs first, then trees that each reference earlier objects, so the result is a DAG
/// where later trees tend to share earlier ones.
fn build(blobs: &[Vec<u8>], trees: &[Vec<Index>]) -> Graph {
    let mut source = MemoryObjectSource::new();
    let mut objects: Vec<(ObjectHash, bool)> = Vec::new();
    let mut children = HashMap::new();
    let mut sizes = HashMap::new();

    for data in blobs {
        let hash = source.add_blob(data.clone());
        sizes.insert(hash.clone(), data.len() as u64);
        objects.push((hash, false));
    }
    for picks in trees {
        let chosen: Vec<(ObjectHash, bool)> = picks
            .iter()
            .map(|pick| objects[pick.index(objects.len())].clone())
            .collect();
        let names: Vec<String> = (0..chosen.len()).map(|i| format!("e{}", i)).collect();
        let entries: Vec<(u32, &str, &ObjectHash)> = chosen
            .iter()
            .zip(&names)
            .map(|((hash, is_tree), name)| {
                (if *is_tree { DIR_MODE } else { FILE_MODE }, name.as_str(), hash)
            })
            .collect();
        let hash = source.add_tree(&entries).unwrap();
        children.insert(hash.clone(), chosen.into_iter().map(|(h, _)| h).collect());
        objects.push((hash, true));
    }

    let root = objects.last().unwrap().0.clone();
    Graph {
        source,
        root,
        children,
        sizes,
    }
}

fn reachable(graph: &Graph) -> HashSet<ObjectHash> {
    let mut seen = HashSet::new();
    let mut stack = vec![graph.root.clone()];
    while let Some(hash) = stack.pop() {
        if seen.insert(hash.clone()) {
            if let Some(kids) = graph.children.get(&hash) {
                stack.extend(kids.iter().cloned());
            }
        }
    }
    seen
}

/// Blob bytes of the fully expanded layout: shared objects count once per reference.
fn expanded_bytes(graph: &Graph, hash: &ObjectHash) -> u64 {
    match graph.children.get(hash) {
        Some(kids) => kids.iter().map(|kid| expanded_bytes(graph, kid)).sum(),
        None => graph.sizes[hash],
    }
}

fn graph_strategy() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<Vec<Index>>)> {
    (
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..24), 1..6),
        prop::collection::vec(prop::collection::vec(any::<Index>(), 1..4), 1..7),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_each_distinct_object_is_fetched_once((blobs, trees) in graph_strategy()) {
        let graph = build(&blobs, &trees);
        let temp = TempDir::new().unwrap();
        let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());

        api.add(&graph.source, &graph.root, &mut NoopObserver).unwrap();
        let expected = reachable(&graph);
        prop_assert_eq!(graph.source.fetch_count(), expected.len());
        prop_assert_eq!(api.status().unwrap().objects, expected.len() as u64);
    }

    #[test]
    fn prop_layout_total_matches_expansion((blobs, trees) in graph_strategy()) {
        let graph = build(&blobs, &trees);
        let temp = TempDir::new().unwrap();
        let mut api = StatsApi::new(SledCatalog::open(temp.path()).unwrap());
        api.add(&graph.source, &graph.root, &mut NoopObserver).unwrap();

        let report = api.layout(&graph.root, &EmptyBaseline, true).unwrap();
        let expected = expanded_bytes(&graph, &graph.root);
        prop_assert_eq!(report.total_bytes, expected);
        if let Some(last) = report.rows.last() {
            prop_assert_eq!(last.entry.cumulative, expected);
        }

        let mut cumulative = 0;
        for row in &report.rows {
            prop_assert!(row.entry.cumulative >= cumulative);
            cumulative = row.entry.cumulative;
        }
        prop_assert!(report.new_blob_bytes <= report.total_bytes);
    }
}
