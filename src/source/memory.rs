//! In-memory object source.
//!
//! Objects are addressed by a blake3 digest of `<kind> NUL <content>`, cut to
//! the git id length so trees built here use the regular tree encoding.

use crate::error::StatsError;
use crate::source::git::{encode_tree, TreeEntry, GIT_HASH_LEN};
use crate::source::{ObjectSource, RawObject};
use crate::types::{ObjectHash, ObjectKind};
use std::cell::Cell;
use std::collections::HashMap;

/// Content-addressed object map with a fetch counter.
#[derive(Default)]
pub struct MemoryObjectSource {
    objects: HashMap<ObjectHash, RawObject>,
    fetches: Cell<usize>,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a would-be object without storing it.
    pub fn compute_hash(kind: ObjectKind, data: &[u8]) -> ObjectHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(data);
        ObjectHash::from_bytes(&hasher.finalize().as_bytes()[..GIT_HASH_LEN])
    }

    /// Store an object and return its hash. Storing the same content twice is a no-op.
    pub fn insert(&mut self, kind: ObjectKind, data: Vec<u8>) -> ObjectHash {
        let hash = Self::compute_hash(kind, &data);
        self.objects
            .entry(hash.clone())
            .or_insert(RawObject { kind, data });
        hash
    }

    /// Store an object under an explicit hash, e.g. to model corrupt content.
    pub fn insert_with_hash(&mut self, hash: ObjectHash, kind: ObjectKind, data: Vec<u8>) {
        self.objects.insert(hash, RawObject { kind, data });
    }

    pub fn add_blob(&mut self, data: impl Into<Vec<u8>>) -> ObjectHash {
        self.insert(ObjectKind::Blob, data.into())
    }

    /// Store a tree listing `(mode, name, child)` in the given order.
    pub fn add_tree(&mut self, entries: &[(u32, &str, &ObjectHash)]) -> Result<ObjectHash, StatsError> {
        let entries: Vec<TreeEntry> = entries
            .iter()
            .map(|(mode, name, hash)| TreeEntry {
                mode: *mode,
                name: name.as_bytes().to_vec(),
                hash: (*hash).clone(),
            })
            .collect();
        Ok(self.insert(ObjectKind::Tree, encode_tree(&entries)?))
    }

    /// Store a commit pointing at `tree` with the given parents.
    pub fn add_commit(&mut self, tree: &ObjectHash, parents: &[&ObjectHash], message: &str) -> ObjectHash {
        let mut body = format!("tree {}\n", tree);
        for parent in parents {
            body.push_str(&format!("parent {}\n", parent));
        }
        body.push_str("author Objstat <objstat@localhost> 0 +0000\n");
        body.push_str("committer Objstat <objstat@localhost> 0 +0000\n\n");
        body.push_str(message);
        body.push('\n');
        self.insert(ObjectKind::Commit, body.into_bytes())
    }

    /// Number of `get` calls served so far, misses included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    pub fn reset_fetch_count(&self) {
        self.fetches.set(0);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectSource for MemoryObjectSource {
    fn get(&self, hash: &ObjectHash) -> Result<RawObject, StatsError> {
        self.fetches.set(self.fetches.get() + 1);
        self.objects
            .get(hash)
            .cloned()
            .ok_or_else(|| StatsError::NotFound(hash.clone()))
    }
}
