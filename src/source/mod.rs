//! Object sources
//!
//! Read-only access to the content store being analysed: raw objects by hash,
//! the named roots to start from, and the baseline of hashes already stored
//! efficiently. Nothing here ever writes to the store.

pub mod baseline;
pub mod git;
pub mod loose;
pub mod memory;
pub mod pack;
pub mod refs;
pub mod repo;

pub use baseline::{BaselineSet, EmptyBaseline, HashSetBaseline, PackIndexBaseline};
pub use loose::{resolve_git_dir, LooseObjectSource};
pub use memory::MemoryObjectSource;
pub use pack::{PackIndex, PackStore};
pub use refs::RepoRootProvider;
pub use repo::RepoObjectSource;

use crate::error::StatsError;
use crate::types::{ObjectHash, ObjectKind};

/// Kind and raw content of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

/// Resolves a hash to its raw object. Fails with `NotFound` when absent.
pub trait ObjectSource {
    fn get(&self, hash: &ObjectHash) -> Result<RawObject, StatsError>;
}

impl<T: ObjectSource + ?Sized> ObjectSource for &T {
    fn get(&self, hash: &ObjectHash) -> Result<RawObject, StatsError> {
        (**self).get(hash)
    }
}

/// A named group of root hashes, e.g. the history of one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSet {
    pub name: String,
    pub roots: Vec<ObjectHash>,
    /// Kind every root is asserted to have; checked before cataloguing.
    pub expect: Option<ObjectKind>,
}

/// Enumerates the root sets to catalogue.
pub trait RootProvider {
    fn root_sets(&self) -> Result<Vec<RootSet>, StatsError>;
}
