//! Loose object reader for git-format repositories.
//!
//! Each object lives at `objects/<2 hex>/<rest>` as a zlib stream of
//! `<kind> SP <decimal length> NUL <content>`. Packed objects are read by
//! [`crate::source::pack`]; [`crate::source::RepoObjectSource`] combines both.

use crate::error::StatsError;
use crate::source::{ObjectSource, RawObject};
use crate::types::ObjectHash;
use flate2::read::ZlibDecoder;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Read-only loose object store rooted at a git directory.
pub struct LooseObjectSource {
    objects_dir: PathBuf,
}

impl LooseObjectSource {
    pub fn new(git_dir: &Path) -> Self {
        Self {
            objects_dir: git_dir.join("objects"),
        }
    }

    fn object_path(&self, hash: &ObjectHash) -> Result<PathBuf, StatsError> {
        let hex = hash.as_str();
        if hex.len() < 3 {
            return Err(StatsError::InvalidHash(hex.to_string()));
        }
        Ok(self.objects_dir.join(&hex[..2]).join(&hex[2..]))
    }

    /// Read an object without interpreting its kind (tags included).
    ///
    /// Anything wrong with the object itself is a `CorruptObject`; only the
    /// walk below this object is affected.
    pub fn read_raw(&self, hash: &ObjectHash) -> Result<(String, Vec<u8>), StatsError> {
        let path = self.object_path(hash)?;
        let corrupt = |reason: String| StatsError::CorruptObject {
            hash: hash.clone(),
            reason,
        };
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StatsError::NotFound(hash.clone()))
            }
            Err(e) => return Err(corrupt(format!("cannot open {}: {}", path.display(), e))),
        };

        let mut inflated = Vec::new();
        ZlibDecoder::new(file)
            .read_to_end(&mut inflated)
            .map_err(|e| corrupt(format!("inflate failed: {}", e)))?;
        trace!(hash = %hash, bytes = inflated.len(), "Inflated loose object");

        let (kind, body_start) = parse_header(&inflated).map_err(corrupt)?;
        let data = inflated.split_off(body_start);
        Ok((kind, data))
    }
}

/// Parse `<kind> SP <length> NUL` and check the length against the body.
/// Returns the kind and the offset of the first body byte.
fn parse_header(inflated: &[u8]) -> Result<(String, usize), String> {
    let nul = inflated
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| "no header terminator".to_string())?;
    let header =
        std::str::from_utf8(&inflated[..nul]).map_err(|_| "binary header".to_string())?;
    let (kind, length) = header
        .split_once(' ')
        .ok_or_else(|| format!("header {:?} has no length", header))?;
    let length: usize = length
        .parse()
        .map_err(|_| format!("bad length {:?}", length))?;

    let body = inflated.len() - (nul + 1);
    if body != length {
        return Err(format!("declares {} bytes but holds {}", length, body));
    }
    Ok((kind.to_string(), nul + 1))
}

impl ObjectSource for LooseObjectSource {
    fn get(&self, hash: &ObjectHash) -> Result<RawObject, StatsError> {
        let (kind, data) = self.read_raw(hash)?;
        Ok(RawObject {
            kind: kind.parse()?,
            data,
        })
    }
}

/// Resolve a repository path to its git directory (`<path>/.git` or a bare repo).
pub fn resolve_git_dir(path: &Path) -> Result<PathBuf, StatsError> {
    let path = dunce::canonicalize(path).map_err(|e| {
        StatsError::Repository(format!("cannot open repository {}: {}", path.display(), e))
    })?;
    let dot_git = path.join(".git");
    if dot_git.join("objects").is_dir() {
        return Ok(dot_git);
    }
    if path.join("objects").is_dir() {
        return Ok(path);
    }
    Err(StatsError::Repository(format!(
        "{} is not a git repository",
        path.display()
    )))
}
