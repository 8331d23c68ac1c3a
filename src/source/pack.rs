//! Pack reader for git-format repositories.
//!
//! Each `objects/pack/pack-*.pack` is paired with its `.idx`, which maps object
//! names to byte offsets. An entry is a type-and-size header followed by a zlib
//! stream. Deltified entries (`OFS_DELTA`, `REF_DELTA`) are rebuilt from their
//! base by replaying copy and insert instructions.

use crate::error::StatsError;
use crate::types::ObjectHash;
use flate2::bufread::ZlibDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

const IDX_V2_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const PACK_MAGIC: [u8; 4] = *b"PACK";
const FANOUT_ENTRIES: usize = 256;
const HASH_LEN: usize = 20;
/// Offsets with this bit set index the 8-byte large offset table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

const OBJ_COMMIT: u8 = 1;
const OBJ_TREE: u8 = 2;
const OBJ_BLOB: u8 = 3;
const OBJ_TAG: u8 = 4;
const OBJ_OFS_DELTA: u8 = 6;
const OBJ_REF_DELTA: u8 = 7;

/// Longest delta chain followed before the entry is declared corrupt.
const MAX_DELTA_CHAIN: usize = 4096;

/// Object names and pack offsets from one `.idx` file, sorted by name.
#[derive(Debug, Clone, Default)]
pub struct PackIndex {
    entries: Vec<(ObjectHash, u64)>,
}

fn read_be_u32(bytes: &[u8], offset: usize) -> Result<u32, String> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| format!("truncated at offset {}", offset))
}

fn read_be_u64(bytes: &[u8], offset: usize) -> Result<u64, String> {
    let high = read_be_u32(bytes, offset)? as u64;
    let low = read_be_u32(bytes, offset + 4)? as u64;
    Ok((high << 32) | low)
}

impl PackIndex {
    /// Parse a version 1 or version 2 pack index.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let mut entries = if bytes.starts_with(&IDX_V2_MAGIC) {
            let version = read_be_u32(bytes, 4)?;
            if version != 2 {
                return Err(format!("unsupported pack index version {}", version));
            }
            Self::parse_v2(bytes)?
        } else {
            Self::parse_v1(bytes)?
        };

        if !entries.windows(2).all(|pair| pair[0].0 <= pair[1].0) {
            entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
        Ok(Self { entries })
    }

    /// Version 1: fanout, then `count` entries of a 4-byte offset and a name.
    fn parse_v1(bytes: &[u8]) -> Result<Vec<(ObjectHash, u64)>, String> {
        let count = read_be_u32(bytes, (FANOUT_ENTRIES - 1) * 4)? as usize;
        let start = FANOUT_ENTRIES * 4;
        let stride = 4 + HASH_LEN;
        if bytes.len() < start + count * stride {
            return Err(format!("index lists {} objects but is truncated", count));
        }
        (0..count)
            .map(|i| {
                let entry = start + i * stride;
                let offset = read_be_u32(bytes, entry)? as u64;
                let name = ObjectHash::from_bytes(&bytes[entry + 4..entry + stride]);
                Ok((name, offset))
            })
            .collect()
    }

    /// Version 2: header, fanout, names, CRCs, 4-byte offsets, large offsets.
    fn parse_v2(bytes: &[u8]) -> Result<Vec<(ObjectHash, u64)>, String> {
        let fanout_start = 8;
        let count = read_be_u32(bytes, fanout_start + (FANOUT_ENTRIES - 1) * 4)? as usize;
        let names_start = fanout_start + FANOUT_ENTRIES * 4;
        let crc_start = names_start + count * HASH_LEN;
        let offsets_start = crc_start + count * 4;
        let large_start = offsets_start + count * 4;
        if bytes.len() < large_start {
            return Err(format!("index lists {} objects but is truncated", count));
        }

        (0..count)
            .map(|i| {
                let name_at = names_start + i * HASH_LEN;
                let name = ObjectHash::from_bytes(&bytes[name_at..name_at + HASH_LEN]);
                let small = read_be_u32(bytes, offsets_start + i * 4)?;
                let offset = if small & LARGE_OFFSET_FLAG != 0 {
                    let slot = (small & !LARGE_OFFSET_FLAG) as usize;
                    read_be_u64(bytes, large_start + slot * 8)?
                } else {
                    small as u64
                };
                Ok((name, offset))
            })
            .collect()
    }

    /// Read and parse an index file; parse failures name the file.
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
            .map_err(|reason| StatsError::Repository(format!("{}: {}", path.display(), reason)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &ObjectHash> {
        self.entries.iter().map(|(name, _)| name)
    }

    pub fn offset_of(&self, hash: &ObjectHash) -> Option<u64> {
        self.entries
            .binary_search_by(|(name, _)| name.cmp(hash))
            .ok()
            .map(|i| self.entries[i].1)
    }
}

/// Sorted `.idx` paths under `objects/pack`; empty when there is no pack dir.
pub fn index_paths(git_dir: &Path) -> Result<Vec<PathBuf>, StatsError> {
    let pack_dir = git_dir.join("objects").join("pack");
    if !pack_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = std::fs::read_dir(&pack_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|ext| ext == "idx").unwrap_or(false))
        .collect();
    paths.sort();
    Ok(paths)
}

/// One decoded pack entry before delta resolution.
enum PackEntry {
    Base { kind: u8, data: Vec<u8> },
    OfsDelta { base_offset: u64, delta: Vec<u8> },
    RefDelta { base: ObjectHash, delta: Vec<u8> },
}

struct PackFile {
    path: PathBuf,
    file: File,
    index: PackIndex,
}

impl PackFile {
    fn open(path: PathBuf, index: PackIndex) -> Result<Self, StatsError> {
        let mut file = File::open(&path)?;
        let mut header = [0u8; 12];
        file.read_exact(&mut header).map_err(|e| {
            StatsError::Repository(format!("{}: cannot read pack header: {}", path.display(), e))
        })?;
        if header[..4] != PACK_MAGIC {
            return Err(StatsError::Repository(format!("{}: not a pack file", path.display())));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != 2 && version != 3 {
            return Err(StatsError::Repository(format!(
                "{}: unsupported pack version {}",
                path.display(),
                version
            )));
        }
        Ok(Self { path, file, index })
    }

    fn read_entry(&self, offset: u64) -> Result<PackEntry, String> {
        let mut reader = BufReader::new(&self.file);
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| format!("cannot seek to {}: {}", offset, e))?;

        let mut byte = read_u8(&mut reader)?;
        let kind = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0f) as u64;
        let mut shift = 4;
        while byte & 0x80 != 0 {
            if shift > 57 {
                return Err(format!("entry size at {} overflows", offset));
            }
            byte = read_u8(&mut reader)?;
            size |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }

        match kind {
            OBJ_COMMIT | OBJ_TREE | OBJ_BLOB | OBJ_TAG => Ok(PackEntry::Base {
                kind,
                data: inflate(&mut reader, size)?,
            }),
            OBJ_OFS_DELTA => {
                let distance = read_base_distance(&mut reader)?;
                let base_offset = offset
                    .checked_sub(distance)
                    .filter(|_| distance > 0)
                    .ok_or_else(|| format!("delta at {} points outside the pack", offset))?;
                Ok(PackEntry::OfsDelta {
                    base_offset,
                    delta: inflate(&mut reader, size)?,
                })
            }
            OBJ_REF_DELTA => {
                let mut name = [0u8; HASH_LEN];
                reader
                    .read_exact(&mut name)
                    .map_err(|e| format!("truncated delta base name: {}", e))?;
                Ok(PackEntry::RefDelta {
                    base: ObjectHash::from_bytes(&name),
                    delta: inflate(&mut reader, size)?,
                })
            }
            other => Err(format!("unknown entry type {} at {}", other, offset)),
        }
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, String> {
    let mut byte = [0u8; 1];
    reader
        .read_exact(&mut byte)
        .map_err(|e| format!("truncated entry header: {}", e))?;
    Ok(byte[0])
}

/// `OFS_DELTA` base distance: big-endian groups of 7 bits, each continuation adding one.
fn read_base_distance<R: Read>(reader: &mut R) -> Result<u64, String> {
    let mut byte = read_u8(reader)?;
    let mut distance = (byte & 0x7f) as u64;
    while byte & 0x80 != 0 {
        if distance > (u64::MAX >> 7) - 1 {
            return Err("delta base distance overflows".to_string());
        }
        byte = read_u8(reader)?;
        distance = ((distance + 1) << 7) | (byte & 0x7f) as u64;
    }
    Ok(distance)
}

fn inflate<R: std::io::BufRead>(reader: R, size: u64) -> Result<Vec<u8>, String> {
    let mut data = Vec::new();
    ZlibDecoder::new(reader)
        .take(size + 1)
        .read_to_end(&mut data)
        .map_err(|e| format!("inflate failed: {}", e))?;
    if data.len() as u64 != size {
        return Err(format!("declares {} bytes but holds {}", size, data.len()));
    }
    Ok(data)
}

/// Little-endian base-128 size at the start of a delta.
fn delta_size(delta: &[u8], pos: &mut usize) -> Result<usize, String> {
    let mut size = 0usize;
    let mut shift = 0;
    loop {
        let byte = *delta.get(*pos).ok_or("truncated delta size")?;
        *pos += 1;
        if shift > 57 {
            return Err("delta size overflows".to_string());
        }
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(size);
        }
    }
}

/// Rebuild a target object from `base` and a git delta.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, String> {
    let mut pos = 0;
    let source_size = delta_size(delta, &mut pos)?;
    if source_size != base.len() {
        return Err(format!(
            "delta expects a {} byte base, found {}",
            source_size,
            base.len()
        ));
    }
    let target_size = delta_size(delta, &mut pos)?;
    let mut out = Vec::with_capacity(target_size);

    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;
        if op & 0x80 != 0 {
            let mut next = |present: bool, shift: u32| -> Result<usize, String> {
                if !present {
                    return Ok(0);
                }
                let byte = *delta.get(pos).ok_or("truncated copy instruction")?;
                pos += 1;
                Ok((byte as usize) << shift)
            };
            let mut offset = 0;
            for i in 0..4 {
                offset |= next(op & (1 << i) != 0, 8 * i)?;
            }
            let mut size = 0;
            for i in 0..3 {
                size |= next(op & (0x10 << i) != 0, 8 * i)?;
            }
            if size == 0 {
                size = 0x10000;
            }
            let chunk = offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| format!("copy of {} bytes at {} exceeds the base", size, offset))?;
            out.extend_from_slice(chunk);
        } else if op != 0 {
            let chunk = delta
                .get(pos..pos + op as usize)
                .ok_or("truncated insert instruction")?;
            out.extend_from_slice(chunk);
            pos += op as usize;
        } else {
            return Err("reserved delta opcode 0".to_string());
        }
    }

    if out.len() != target_size {
        return Err(format!(
            "delta declares {} bytes but produced {}",
            target_size,
            out.len()
        ));
    }
    Ok(out)
}

fn kind_name(kind: u8) -> &'static str {
    match kind {
        OBJ_COMMIT => "commit",
        OBJ_TREE => "tree",
        OBJ_BLOB => "blob",
        _ => "tag",
    }
}

/// Every readable pack in a repository.
#[derive(Default)]
pub struct PackStore {
    packs: Vec<PackFile>,
}

impl PackStore {
    /// Open each `.idx` that has a matching `.pack`. An index without its pack
    /// is skipped: its names still count for the baseline but cannot be read.
    pub fn open(git_dir: &Path) -> Result<Self, StatsError> {
        let mut packs = Vec::new();
        for idx_path in index_paths(git_dir)? {
            let pack_path = idx_path.with_extension("pack");
            if !pack_path.is_file() {
                warn!(index = %idx_path.display(), "Pack index has no pack; its objects are unreadable");
                continue;
            }
            let index = PackIndex::load(&idx_path)?;
            debug!(pack = %pack_path.display(), objects = index.len(), "Opened pack");
            packs.push(PackFile::open(pack_path, index)?);
        }
        if !packs.is_empty() {
            info!(
                packs = packs.len(),
                objects = packs.iter().map(|p| p.index.len()).sum::<usize>(),
                "Opened packs"
            );
        }
        Ok(Self { packs })
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.locate(hash).is_some()
    }

    fn locate(&self, hash: &ObjectHash) -> Option<(usize, u64)> {
        self.packs
            .iter()
            .enumerate()
            .find_map(|(i, pack)| pack.index.offset_of(hash).map(|offset| (i, offset)))
    }

    /// Kind name and content of a packed object, or `None` when no pack has it.
    pub fn read_raw(&self, hash: &ObjectHash) -> Result<Option<(String, Vec<u8>)>, StatsError> {
        let Some((pack, offset)) = self.locate(hash) else {
            return Ok(None);
        };
        let (kind, data) = self.resolve(pack, offset).map_err(|reason| {
            StatsError::CorruptObject {
                hash: hash.clone(),
                reason: format!("{}: {}", self.packs[pack].path.display(), reason),
            }
        })?;
        trace!(hash = %hash, bytes = data.len(), "Read packed object");
        Ok(Some((kind_name(kind).to_string(), data)))
    }

    /// Walk the delta chain down to its base, then apply the deltas outward.
    // TODO: cache resolved bases per (pack, offset); shared chains are re-inflated for every object.
    fn resolve(&self, pack: usize, offset: u64) -> Result<(u8, Vec<u8>), String> {
        let mut deltas = Vec::new();
        let (mut pack, mut offset) = (pack, offset);
        let (kind, mut data) = loop {
            if deltas.len() > MAX_DELTA_CHAIN {
                return Err(format!("delta chain longer than {}", MAX_DELTA_CHAIN));
            }
            match self.packs[pack].read_entry(offset)? {
                PackEntry::Base { kind, data } => break (kind, data),
                PackEntry::OfsDelta { base_offset, delta } => {
                    deltas.push(delta);
                    offset = base_offset;
                }
                PackEntry::RefDelta { base, delta } => {
                    deltas.push(delta);
                    (pack, offset) = self
                        .locate(&base)
                        .ok_or_else(|| format!("delta base {} is not in any pack", base))?;
                }
            }
        };
        for delta in deltas.iter().rev() {
            data = apply_delta(&data, delta)?;
        }
        Ok((kind, data))
    }
}
