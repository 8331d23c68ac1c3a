//! Core identifiers shared by the catalog, the walkers and the object sources.

use crate::error::StatsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog-assigned object id. Ids start at 1; 0 is the virtual root.
pub type ObjectId = u64;

/// Parent id used for every externally supplied root.
pub const VIRTUAL_ROOT: ObjectId = 0;

/// Mode and name of the edge from the virtual root to a root object.
pub const ROOT_EDGE_MODE: u32 = 0;
pub const ROOT_EDGE_NAME: &str = "-";

/// Mode and name of the edge from a commit to its root tree.
pub const COMMIT_EDGE_MODE: u32 = 0;
pub const COMMIT_EDGE_NAME: &str = "commit";

/// Tree entry mode of a submodule commit. The commit lives in another repository.
pub const GITLINK_MODE: u32 = 0o160000;

/// Content hash in lowercase hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHash(String);

impl ObjectHash {
    /// Parse a hex digest. Accepts upper or lower case, stores lower case.
    pub fn parse(s: &str) -> Result<Self, StatsError> {
        let s = s.trim();
        if s.is_empty() || s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StatsError::InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Build from a raw binary digest (as found in tree entries and pack indexes).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectHash {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Object kind. Closed set: anything else is reported as `UnknownKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            other => Err(StatsError::UnknownKind(other.to_string())),
        }
    }
}
