//! Git object formats: tree listings, commit and tag headers.

use crate::error::StatsError;
use crate::types::{ObjectHash, ObjectKind};

/// Length of a binary object id inside a tree entry.
pub const GIT_HASH_LEN: usize = 20;

/// One `(mode, name, child)` entry of a tree, in listing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    /// Raw name bytes; not guaranteed to be UTF-8.
    pub name: Vec<u8>,
    pub hash: ObjectHash,
}

fn malformed(hash: &ObjectHash, kind: ObjectKind, reason: impl Into<String>) -> StatsError {
    StatsError::MalformedContent {
        hash: hash.clone(),
        kind,
        reason: reason.into(),
    }
}

/// Decode a tree: repeated `<octal mode> SP <name> NUL <20-byte id>`.
pub fn decode_tree(hash: &ObjectHash, data: &[u8]) -> Result<Vec<TreeEntry>, StatsError> {
    let mut entries = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| malformed(hash, ObjectKind::Tree, "entry without mode separator"))?;
        let mode_text = std::str::from_utf8(&rest[..space])
            .map_err(|_| malformed(hash, ObjectKind::Tree, "mode is not ASCII"))?;
        let mode = u32::from_str_radix(mode_text, 8)
            .map_err(|_| malformed(hash, ObjectKind::Tree, format!("bad mode {:?}", mode_text)))?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| malformed(hash, ObjectKind::Tree, "entry name is not terminated"))?;
        let name = rest[..nul].to_vec();
        rest = &rest[nul + 1..];

        if rest.len() < GIT_HASH_LEN {
            return Err(malformed(hash, ObjectKind::Tree, "truncated entry id"));
        }
        let child = ObjectHash::from_bytes(&rest[..GIT_HASH_LEN]);
        rest = &rest[GIT_HASH_LEN..];

        entries.push(TreeEntry {
            mode,
            name,
            hash: child,
        });
    }
    Ok(entries)
}

/// Encode entries in tree format. Inverse of [`decode_tree`].
pub fn encode_tree(entries: &[TreeEntry]) -> Result<Vec<u8>, StatsError> {
    let mut out = Vec::new();
    for entry in entries {
        let id = hex::decode(entry.hash.as_str())
            .map_err(|_| StatsError::InvalidHash(entry.hash.to_string()))?;
        if id.len() != GIT_HASH_LEN {
            return Err(StatsError::InvalidHash(entry.hash.to_string()));
        }
        out.extend_from_slice(format!("{:o} ", entry.mode).as_bytes());
        out.extend_from_slice(&entry.name);
        out.push(0);
        out.extend_from_slice(&id);
    }
    Ok(out)
}

/// Header lines of a commit or tag, up to the first blank line.
fn header_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|b| *b == b'\n').take_while(|line| !line.is_empty())
}

fn header_value<'a>(line: &'a [u8], field: &str) -> Option<&'a [u8]> {
    line.strip_prefix(field.as_bytes())
        .and_then(|rest| rest.strip_prefix(b" "))
}

fn parse_header_hash(value: &[u8]) -> Option<ObjectHash> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|text| ObjectHash::parse(text.trim_end()).ok())
}

/// Extract the root tree of a commit.
pub fn parse_commit(hash: &ObjectHash, data: &[u8]) -> Result<ObjectHash, StatsError> {
    let mut trees = header_lines(data).filter_map(|line| header_value(line, "tree"));
    let value = trees
        .next()
        .ok_or_else(|| malformed(hash, ObjectKind::Commit, "missing tree header"))?;
    if trees.next().is_some() {
        return Err(malformed(hash, ObjectKind::Commit, "more than one tree header"));
    }
    parse_header_hash(value)
        .ok_or_else(|| malformed(hash, ObjectKind::Commit, "invalid tree hash"))
}

/// Parent commits listed in a commit header, in header order.
pub fn parse_parents(hash: &ObjectHash, data: &[u8]) -> Result<Vec<ObjectHash>, StatsError> {
    header_lines(data)
        .filter_map(|line| header_value(line, "parent"))
        .map(|value| {
            parse_header_hash(value)
                .ok_or_else(|| malformed(hash, ObjectKind::Commit, "invalid parent hash"))
        })
        .collect()
}

/// Target hash and target type of an annotated tag.
pub fn parse_tag(data: &[u8]) -> Option<(ObjectHash, String)> {
    let mut target = None;
    let mut kind = None;
    for line in header_lines(data) {
        if let Some(value) = header_value(line, "object") {
            target = parse_header_hash(value);
        } else if let Some(value) = header_value(line, "type") {
            kind = std::str::from_utf8(value).ok().map(|s| s.trim().to_string());
        }
    }
    Some((target?, kind?))
}
