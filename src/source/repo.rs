//! Object source for a whole git-format repository: packs, then loose objects.

use crate::error::StatsError;
use crate::source::loose::LooseObjectSource;
use crate::source::pack::PackStore;
use crate::source::{ObjectSource, RawObject};
use crate::types::ObjectHash;
use std::path::Path;

pub struct RepoObjectSource {
    packs: PackStore,
    loose: LooseObjectSource,
}

impl RepoObjectSource {
    pub fn open(git_dir: &Path) -> Result<Self, StatsError> {
        Ok(Self {
            packs: PackStore::open(git_dir)?,
            loose: LooseObjectSource::new(git_dir),
        })
    }

    pub fn pack_count(&self) -> usize {
        self.packs.pack_count()
    }

    /// Read an object without interpreting its kind (tags included).
    pub fn read_raw(&self, hash: &ObjectHash) -> Result<(String, Vec<u8>), StatsError> {
        match self.packs.read_raw(hash)? {
            Some(object) => Ok(object),
            None => self.loose.read_raw(hash),
        }
    }
}

impl ObjectSource for RepoObjectSource {
    fn get(&self, hash: &ObjectHash) -> Result<RawObject, StatsError> {
        let (kind, data) = self.read_raw(hash)?;
        Ok(RawObject {
            kind: kind.parse()?,
            data,
        })
    }
}
