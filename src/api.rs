//! Catalog API
//!
//! The operations behind every command. [`StatsApi`] owns one catalog and is
//! handed its collaborators (object source, root provider, baseline) per call,
//! so the same code runs against a repository on disk or an in-memory store.

use crate::error::{StatsError, StorageError};
use crate::graph::{GraphWalker, LayoutReport, LinearStatsWalker, WalkEvent, WalkStats};
use crate::source::{BaselineSet, ObjectSource, RootProvider, RootSet};
use crate::store::{Catalog, CatalogInfo, SledCatalog};
use crate::types::{ObjectHash, VIRTUAL_ROOT};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Receives walk events as they happen.
pub trait WalkObserver {
    fn on_root_set(&mut self, _set: &RootSet) {}
    fn on_event(&mut self, event: &WalkEvent);
    fn on_finish(&mut self) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl WalkObserver for NoopObserver {
    fn on_event(&mut self, _event: &WalkEvent) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub root_sets: usize,
    pub roots: usize,
    pub generation: u64,
    pub stats: WalkStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AddOutcome {
    /// The hash was catalogued before; nothing was fetched or written.
    AlreadyPresent { hash: ObjectHash },
    Added {
        hash: ObjectHash,
        generation: u64,
        stats: WalkStats,
    },
}

/// Number of catalogued children of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtreeSize {
    pub hash: ObjectHash,
    pub children: u64,
}

/// Number of parents that have exactly `children` catalogued children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutBucket {
    pub children: u64,
    pub parents: u64,
}

pub struct StatsApi {
    catalog: SledCatalog,
}

impl StatsApi {
    pub fn new(catalog: SledCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SledCatalog {
        &self.catalog
    }

    /// Discard the catalog and re-catalogue every root the provider lists.
    ///
    /// Nothing is published unless the walk discovers at least one object and
    /// completes; on any error the previously published catalog stays intact.
    pub fn rebuild<S, P>(
        &mut self,
        source: &S,
        provider: &P,
        observer: &mut dyn WalkObserver,
    ) -> Result<RebuildSummary, StatsError>
    where
        S: ObjectSource + ?Sized,
        P: RootProvider + ?Sized,
    {
        let sets = provider.root_sets()?;
        self.catalog.reset();

        let mut stats = WalkStats::default();
        let mut roots = 0;
        for set in &sets {
            info!(name = %set.name, roots = set.roots.len(), "Traversing {} to find reachable objects", set.name);
            observer.on_root_set(set);
            roots += set.roots.len();

            let mut walker = GraphWalker::new(&mut self.catalog, source);
            for root in &set.roots {
                walker.push_root(root.clone(), set.expect);
            }
            if let Err(e) = drain(&mut walker, observer) {
                self.catalog.rollback()?;
                return Err(e);
            }
            stats.merge(walker.stats());
        }
        observer.on_finish();

        if stats.discovered == 0 {
            self.catalog.rollback()?;
            return Err(StatsError::NoReachableObjects);
        }

        let generation = self.catalog.commit()?;
        info!(
            generation,
            objects = stats.discovered,
            failed = stats.failed,
            "Catalog rebuilt"
        );
        Ok(RebuildSummary {
            root_sets: sets.len(),
            roots,
            generation,
            stats,
        })
    }

    /// Catalogue one more root on top of what is already published.
    pub fn add<S>(
        &mut self,
        source: &S,
        hash: &ObjectHash,
        observer: &mut dyn WalkObserver,
    ) -> Result<AddOutcome, StatsError>
    where
        S: ObjectSource + ?Sized,
    {
        if self.catalog.lookup(hash)?.is_some() {
            info!(hash = %hash, "Object {} is already in the catalog", hash);
            return Ok(AddOutcome::AlreadyPresent { hash: hash.clone() });
        }

        let mut walker = GraphWalker::new(&mut self.catalog, source);
        walker.push_root(hash.clone(), None);
        let drained = drain(&mut walker, observer);
        let stats = walker.into_stats();
        if let Err(e) = drained {
            self.catalog.rollback()?;
            return Err(e);
        }
        observer.on_finish();

        if stats.discovered == 0 {
            self.catalog.rollback()?;
            return Err(StatsError::NoReachableObjects);
        }

        let generation = self.catalog.commit()?;
        Ok(AddOutcome::Added {
            hash: hash.clone(),
            generation,
            stats,
        })
    }

    /// Lay out the blobs below a catalogued object and summarise them against `baseline`.
    pub fn layout<B>(
        &self,
        hash: &ObjectHash,
        baseline: &B,
        keep_rows: bool,
    ) -> Result<LayoutReport, StatsError>
    where
        B: BaselineSet + ?Sized,
    {
        self.catalog.require_exists()?;
        let object = self
            .catalog
            .find(hash)?
            .ok_or_else(|| StatsError::HashNotFound(hash.clone()))?;

        let walker = LinearStatsWalker::new(&self.catalog, object.id, 0, 0)?;
        let mut report = LayoutReport::collect(walker, baseline, keep_rows)?;
        report.root = Some(object.hash);
        debug!(
            root = %hash,
            total = report.total_bytes,
            new_blobs = report.new_blob_count,
            "Layout collected"
        );
        Ok(report)
    }

    /// Distinct objects that reference `hash`. The virtual root is not an object.
    pub fn parents_of(&self, hash: &ObjectHash) -> Result<Vec<ObjectHash>, StatsError> {
        self.catalog.require_exists()?;
        let object = self
            .catalog
            .find(hash)?
            .ok_or_else(|| StatsError::HashNotFound(hash.clone()))?;

        let mut parents = Vec::new();
        for parent in self.catalog.parents(object.id)? {
            if parent == VIRTUAL_ROOT {
                continue;
            }
            parents.push(self.resolve(parent)?);
        }
        Ok(parents)
    }

    /// Child counts of every catalogued parent, smallest first.
    pub fn subtree_sizes(&self) -> Result<Vec<SubtreeSize>, StatsError> {
        self.catalog.require_exists()?;
        let mut sizes = Vec::new();
        for (parent, children) in self.catalog.child_counts()? {
            if parent == VIRTUAL_ROOT {
                continue;
            }
            sizes.push(SubtreeSize {
                hash: self.resolve(parent)?,
                children,
            });
        }
        sizes.sort_by(|a, b| a.children.cmp(&b.children).then_with(|| a.hash.cmp(&b.hash)));
        Ok(sizes)
    }

    /// Parents grouped by child count, fewest children first.
    pub fn subtree_histogram(&self) -> Result<Vec<FanoutBucket>, StatsError> {
        self.catalog.require_exists()?;
        let mut buckets: BTreeMap<u64, u64> = BTreeMap::new();
        for (parent, children) in self.catalog.child_counts()? {
            if parent != VIRTUAL_ROOT {
                *buckets.entry(children).or_default() += 1;
            }
        }
        Ok(buckets
            .into_iter()
            .map(|(children, parents)| FanoutBucket { children, parents })
            .collect())
    }

    /// Parents with at least `min_children` children, largest first, ties by hash.
    pub fn heavy_parents(&self, min_children: u64) -> Result<Vec<SubtreeSize>, StatsError> {
        self.catalog.require_exists()?;
        let mut heavy = Vec::new();
        for (parent, children) in self.catalog.child_counts()? {
            if parent == VIRTUAL_ROOT || children < min_children {
                continue;
            }
            heavy.push(SubtreeSize {
                hash: self.resolve(parent)?,
                children,
            });
        }
        heavy.sort_by(|a, b| b.children.cmp(&a.children).then_with(|| a.hash.cmp(&b.hash)));
        Ok(heavy)
    }

    pub fn status(&self) -> Result<CatalogInfo, StatsError> {
        Ok(self.catalog.info()?)
    }

    fn resolve(&self, id: u64) -> Result<ObjectHash, StatsError> {
        match self.catalog.hash_of(id)? {
            Some(hash) => Ok(hash),
            None => {
                warn!(id, "Edge refers to an unknown object");
                Err(StorageError::Corrupt(format!("edge refers to unknown object id {}", id)).into())
            }
        }
    }
}

fn drain<C, S>(
    walker: &mut GraphWalker<'_, C, S>,
    observer: &mut dyn WalkObserver,
) -> Result<(), StatsError>
where
    C: Catalog,
    S: ObjectSource + ?Sized,
{
    for event in walker {
        observer.on_event(&event?);
    }
    Ok(())
}
