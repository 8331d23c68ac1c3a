//! Memoized DAG walker that populates the catalog.

use crate::error::StatsError;
use crate::source::git::{decode_tree, parse_commit};
use crate::source::ObjectSource;
use crate::store::Catalog;
use crate::types::{
    ObjectHash, ObjectId, ObjectKind, COMMIT_EDGE_MODE, COMMIT_EDGE_NAME, GITLINK_MODE,
    ROOT_EDGE_MODE, ROOT_EDGE_NAME, VIRTUAL_ROOT,
};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{trace, warn};

/// A newly catalogued object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub kind: ObjectKind,
    pub hash: ObjectHash,
    pub size: u64,
    pub depth: usize,
}

/// One step of the walk.
#[derive(Debug)]
pub enum WalkEvent {
    /// Fetched and catalogued for the first time.
    Discovered(Discovery),
    /// Already catalogued: only the reference was recorded, nothing was fetched.
    AlreadyPresent { hash: ObjectHash, depth: usize },
    /// Submodule commit: catalogued as an empty commit, never fetched.
    Gitlink { hash: ObjectHash, depth: usize },
    /// The branch below `hash` was abandoned; the walk continues with its siblings.
    Failed { hash: ObjectHash, error: StatsError },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub discovered: u64,
    pub fetched: u64,
    pub already_present: u64,
    pub failed: u64,
    pub gitlinks: u64,
    pub blobs: u64,
    pub trees: u64,
    pub commits: u64,
    pub bytes: u64,
}

impl WalkStats {
    /// Add the counters of another walk.
    pub fn merge(&mut self, other: &WalkStats) {
        self.discovered += other.discovered;
        self.fetched += other.fetched;
        self.already_present += other.already_present;
        self.failed += other.failed;
        self.gitlinks += other.gitlinks;
        self.blobs += other.blobs;
        self.trees += other.trees;
        self.commits += other.commits;
        self.bytes += other.bytes;
    }

    fn record(&mut self, kind: ObjectKind, size: u64) {
        self.discovered += 1;
        self.bytes += size;
        match kind {
            ObjectKind::Blob => self.blobs += 1,
            ObjectKind::Tree => self.trees += 1,
            ObjectKind::Commit => self.commits += 1,
        }
    }
}

/// A pending reference `parent --(mode, name)--> hash`.
#[derive(Debug)]
struct Visit {
    parent: ObjectId,
    mode: u32,
    name: Vec<u8>,
    hash: ObjectHash,
    depth: usize,
    expect: Option<ObjectKind>,
}

/// Lazily walks the object graph from a queue of roots.
///
/// Each call to `next` handles exactly one reference. The catalog lookup runs
/// before any fetch, so an object already catalogued (in this run or a previous
/// one) is neither fetched nor descended into again; only its edge is recorded.
///
/// Children are visited depth-first in listing order. A fatal (storage) error
/// ends the iteration; branch-level errors are reported as [`WalkEvent::Failed`].
pub struct GraphWalker<'a, C: Catalog, S: ObjectSource + ?Sized> {
    catalog: &'a mut C,
    source: &'a S,
    roots: VecDeque<Visit>,
    stack: Vec<Visit>,
    deferred: Option<WalkEvent>,
    stats: WalkStats,
    done: bool,
}

impl<'a, C: Catalog, S: ObjectSource + ?Sized> GraphWalker<'a, C, S> {
    pub fn new(catalog: &'a mut C, source: &'a S) -> Self {
        Self {
            catalog,
            source,
            roots: VecDeque::new(),
            stack: Vec::new(),
            deferred: None,
            stats: WalkStats::default(),
            done: false,
        }
    }

    /// Queue a root below the virtual root. With `expect`, the root's kind is
    /// verified before it is catalogued.
    pub fn push_root(&mut self, hash: ObjectHash, expect: Option<ObjectKind>) {
        self.roots.push_back(Visit {
            parent: VIRTUAL_ROOT,
            mode: ROOT_EDGE_MODE,
            name: ROOT_EDGE_NAME.as_bytes().to_vec(),
            hash,
            depth: 0,
            expect,
        });
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    pub fn into_stats(self) -> WalkStats {
        self.stats
    }

    fn visit(&mut self, visit: Visit) -> Result<WalkEvent, StatsError> {
        if let Some(id) = self.catalog.lookup(&visit.hash)? {
            self.catalog
                .insert_edge(visit.parent, id, visit.mode, &visit.name)?;
            self.stats.already_present += 1;
            trace!(hash = %visit.hash, "Already catalogued");
            return Ok(WalkEvent::AlreadyPresent {
                hash: visit.hash,
                depth: visit.depth,
            });
        }

        if visit.mode == GITLINK_MODE {
            let (id, _) = self.catalog.insert_object(&visit.hash, ObjectKind::Commit, 0)?;
            self.catalog
                .insert_edge(visit.parent, id, visit.mode, &visit.name)?;
            self.stats.gitlinks += 1;
            trace!(hash = %visit.hash, "Submodule commit recorded without fetch");
            return Ok(WalkEvent::Gitlink {
                hash: visit.hash,
                depth: visit.depth,
            });
        }

        let raw = self.source.get(&visit.hash)?;
        self.stats.fetched += 1;
        if let Some(expected) = visit.expect {
            if raw.kind != expected {
                return Err(StatsError::KindMismatch {
                    hash: visit.hash,
                    expected,
                    actual: raw.kind,
                });
            }
        }

        let size = raw.data.len() as u64;
        let (id, _) = self.catalog.insert_object(&visit.hash, raw.kind, size)?;
        self.catalog
            .insert_edge(visit.parent, id, visit.mode, &visit.name)?;
        self.stats.record(raw.kind, size);

        let children = match raw.kind {
            ObjectKind::Blob => Ok(Vec::new()),
            ObjectKind::Tree => decode_tree(&visit.hash, &raw.data).map(|entries| {
                entries
                    .into_iter()
                    .map(|entry| Visit {
                        parent: id,
                        mode: entry.mode,
                        name: entry.name,
                        hash: entry.hash,
                        depth: visit.depth + 1,
                        expect: None,
                    })
                    .collect()
            }),
            ObjectKind::Commit => parse_commit(&visit.hash, &raw.data).map(|tree| {
                vec![Visit {
                    parent: id,
                    mode: COMMIT_EDGE_MODE,
                    name: COMMIT_EDGE_NAME.as_bytes().to_vec(),
                    hash: tree,
                    depth: visit.depth + 1,
                    expect: None,
                }]
            }),
        };

        match children {
            Ok(children) => self.stack.extend(children.into_iter().rev()),
            Err(error) => self.deferred = Some(self.failure(visit.hash.clone(), error)),
        }

        Ok(WalkEvent::Discovered(Discovery {
            kind: raw.kind,
            hash: visit.hash,
            size,
            depth: visit.depth,
        }))
    }

    fn failure(&mut self, hash: ObjectHash, error: StatsError) -> WalkEvent {
        self.stats.failed += 1;
        warn!(hash = %hash, error = %error, "Skipping unreadable branch");
        WalkEvent::Failed { hash, error }
    }
}

impl<C: Catalog, S: ObjectSource + ?Sized> Iterator for GraphWalker<'_, C, S> {
    type Item = Result<WalkEvent, StatsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(event) = self.deferred.take() {
            return Some(Ok(event));
        }

        let visit = match self.stack.pop() {
            Some(visit) => visit,
            None => self.roots.pop_front()?,
        };
        let hash = visit.hash.clone();

        match self.visit(visit) {
            Ok(event) => Some(Ok(event)),
            Err(error) if error.is_branch_local() => Some(Ok(self.failure(hash, error))),
            Err(error) => {
                self.done = true;
                self.stack.clear();
                self.roots.clear();
                Some(Err(error))
            }
        }
    }
}
