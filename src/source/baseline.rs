//! Baseline sets: hashes that are already stored efficiently and therefore do
//! not count as new data in layout reports.

use crate::error::StatsError;
use crate::source::pack::{index_paths, PackIndex};
use crate::types::ObjectHash;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

pub trait BaselineSet {
    fn contains(&self, hash: &ObjectHash) -> bool;
}

/// Baseline with no members: every object counts as new.
pub struct EmptyBaseline;

impl BaselineSet for EmptyBaseline {
    fn contains(&self, _hash: &ObjectHash) -> bool {
        false
    }
}

/// Explicit set of hashes.
#[derive(Debug, Default, Clone)]
pub struct HashSetBaseline {
    hashes: HashSet<ObjectHash>,
}

impl HashSetBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: ObjectHash) {
        self.hashes.insert(hash);
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Load a text file with one hex hash per line; `#` starts a comment.
    pub fn load_file(path: &Path) -> Result<Self, StatsError> {
        let text = std::fs::read_to_string(path)?;
        let mut baseline = Self::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            baseline.insert(ObjectHash::parse(line)?);
        }
        debug!(path = %path.display(), hashes = baseline.len(), "Loaded baseline file");
        Ok(baseline)
    }
}

impl FromIterator<ObjectHash> for HashSetBaseline {
    fn from_iter<I: IntoIterator<Item = ObjectHash>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

impl BaselineSet for HashSetBaseline {
    fn contains(&self, hash: &ObjectHash) -> bool {
        self.hashes.contains(hash)
    }
}

/// Every object listed in the repository's pack indexes (`objects/pack/*.idx`).
pub struct PackIndexBaseline {
    inner: HashSetBaseline,
    packs: usize,
}

impl PackIndexBaseline {
    pub fn load(git_dir: &Path) -> Result<Self, StatsError> {
        let mut inner = HashSetBaseline::new();
        let mut packs = 0;
        for path in index_paths(git_dir)? {
            inner.hashes.extend(PackIndex::load(&path)?.names().cloned());
            packs += 1;
        }

        info!(packs, objects = inner.len(), "Loaded pack index baseline");
        Ok(Self { inner, packs })
    }

    pub fn pack_count(&self) -> usize {
        self.packs
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl BaselineSet for PackIndexBaseline {
    fn contains(&self, hash: &ObjectHash) -> bool {
        self.inner.contains(hash)
    }
}
