//! Object Catalog
//!
//! Persistent index of every object discovered in the object graph and of every
//! parent→child reference between them. Acts as the memo table for the graph
//! walker and as the data source for the layout and parent reports.

pub mod persistence;

pub use persistence::SledCatalog;

use crate::error::StorageError;
use crate::types::{ObjectHash, ObjectId, ObjectKind};
use serde::{Deserialize, Serialize};

/// Stored in place of child names that are not valid UTF-8.
pub const PLACEHOLDER_NAME: &str = "unicode_name";

/// Value stored under an object's hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub size: u64,
}

/// Value stored for one parent→child reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub child: ObjectId,
    pub mode: u32,
    pub name: String,
}

/// A catalogued object resolved back to its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogObject {
    pub id: ObjectId,
    pub hash: ObjectHash,
    pub kind: ObjectKind,
    pub size: u64,
}

/// A direct child of some parent, in recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildEntry {
    pub object: CatalogObject,
    pub mode: u32,
    pub name: String,
}

/// Summary of the published catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    pub generation: Option<u64>,
    pub objects: u64,
    pub edges: u64,
    pub built_at: Option<String>,
}

/// Catalog interface used by the walkers.
///
/// Writes are buffered until the implementation publishes them; reads always
/// see the buffered writes of the current run.
pub trait Catalog {
    fn lookup(&self, hash: &ObjectHash) -> Result<Option<ObjectId>, StorageError>;

    /// Insert an object. Returns the id and whether the row is new; an existing
    /// row keeps its original kind and size.
    fn insert_object(
        &mut self,
        hash: &ObjectHash,
        kind: ObjectKind,
        size: u64,
    ) -> Result<(ObjectId, bool), StorageError>;

    /// Record a reference. A repeated `(parent, child, name)` is a no-op.
    ///
    /// `name` is the raw name bytes; names that are not UTF-8 are stored as
    /// [`PLACEHOLDER_NAME`].
    fn insert_edge(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        mode: u32,
        name: &[u8],
    ) -> Result<(), StorageError>;

    fn object(&self, id: ObjectId) -> Result<Option<CatalogObject>, StorageError>;

    fn hash_of(&self, id: ObjectId) -> Result<Option<ObjectHash>, StorageError> {
        Ok(self.object(id)?.map(|object| object.hash))
    }

    fn children(&self, parent: ObjectId) -> Result<Vec<ChildEntry>, StorageError>;

    /// Distinct direct parents of `child`, virtual root included.
    fn parents(&self, child: ObjectId) -> Result<Vec<ObjectId>, StorageError>;

    /// Number of recorded references per parent, in parent id order.
    fn child_counts(&self) -> Result<Vec<(ObjectId, u64)>, StorageError>;

    /// Resolve a hash to its catalogued object.
    fn find(&self, hash: &ObjectHash) -> Result<Option<CatalogObject>, StorageError> {
        match self.lookup(hash)? {
            Some(id) => self.object(id),
            None => Ok(None),
        }
    }
}
