//! Shared fixtures: an on-disk bare repository built from in-memory objects.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use objstat::source::{MemoryObjectSource, ObjectSource};
use objstat::types::{ObjectHash, ObjectKind};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FILE_MODE: u32 = 0o100644;
pub const DIR_MODE: u32 = 0o40000;

/// Bare repository whose loose objects are written as they are created.
pub struct RepoFixture {
    pub temp: TempDir,
    pub git_dir: PathBuf,
    pub objects: MemoryObjectSource,
}

impl RepoFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let git_dir = temp.path().join("repo.git");
        std::fs::create_dir_all(git_dir.join("objects").join("pack")).unwrap();
        std::fs::create_dir_all(git_dir.join("refs").join("heads")).unwrap();
        std::fs::create_dir_all(git_dir.join("refs").join("tags")).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        Self {
            temp,
            git_dir,
            objects: MemoryObjectSource::new(),
        }
    }

    pub fn blob(&mut self, data: &[u8]) -> ObjectHash {
        let hash = self.objects.add_blob(data);
        self.persist(&hash);
        hash
    }

    pub fn tree(&mut self, entries: &[(u32, &str, &ObjectHash)]) -> ObjectHash {
        let hash = self.objects.add_tree(entries).unwrap();
        self.persist(&hash);
        hash
    }

    pub fn commit(&mut self, tree: &ObjectHash, parents: &[&ObjectHash], message: &str) -> ObjectHash {
        let hash = self.objects.add_commit(tree, parents, message);
        self.persist(&hash);
        hash
    }

    /// Annotated tag object pointing at `target`.
    pub fn annotated_tag(&mut self, name: &str, target: &ObjectHash, target_kind: &str) -> ObjectHash {
        let body = format!(
            "object {}\ntype {}\ntag {}\ntagger Objstat <objstat@localhost> 0 +0000\n\n{}\n",
            target, target_kind, name, name
        );
        let digest = blake3::hash(body.as_bytes());
        let hash = ObjectHash::from_bytes(&digest.as_bytes()[..20]);
        write_loose(&self.git_dir, &hash, "tag", body.as_bytes());
        hash
    }

    pub fn set_ref(&self, name: &str, hash: &ObjectHash) {
        let path = self.git_dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{}\n", hash)).unwrap();
    }

    /// Write a version 2 pack index listing `hashes` (the pack itself is not needed).
    pub fn pack_index(&self, name: &str, hashes: &[ObjectHash]) {
        let entries = hashes
            .iter()
            .map(|h| (hex::decode(h.as_str()).unwrap(), 0))
            .collect();
        std::fs::write(self.pack_dir().join(format!("{}.idx", name)), index_v2(entries)).unwrap();
    }

    /// Move `hashes` out of loose storage into a real pack with its index.
    /// Blobs after the first are stored as `OFS_DELTA` entries against it.
    pub fn pack(&self, name: &str, hashes: &[ObjectHash]) {
        let mut body = Vec::new();
        let mut entries = Vec::new();
        let mut first_blob: Option<(u64, usize)> = None;

        for hash in hashes {
            let raw = self.objects.get(hash).unwrap();
            let offset = 12 + body.len() as u64;
            entries.push((hex::decode(hash.as_str()).unwrap(), offset as u32));
            match (raw.kind, first_blob) {
                (ObjectKind::Blob, Some((base_offset, base_len))) => {
                    let delta = insert_delta(base_len, &raw.data);
                    body.extend(entry_header(6, delta.len()));
                    body.extend(base_distance(offset - base_offset));
                    body.extend(deflate(&delta));
                }
                (kind, _) => {
                    if kind == ObjectKind::Blob {
                        first_blob = Some((offset, raw.data.len()));
                    }
                    let code = match kind {
                        ObjectKind::Commit => 1,
                        ObjectKind::Tree => 2,
                        ObjectKind::Blob => 3,
                    };
                    body.extend(entry_header(code, raw.data.len()));
                    body.extend(deflate(&raw.data));
                }
            }
            self.remove_object(hash);
        }

        let mut pack = b"PACK".to_vec();
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&(hashes.len() as u32).to_be_bytes());
        pack.extend(body);
        pack.extend_from_slice(&[0u8; 20]);
        std::fs::write(self.pack_dir().join(format!("{}.pack", name)), pack).unwrap();
        std::fs::write(self.pack_dir().join(format!("{}.idx", name)), index_v2(entries)).unwrap();
    }

    fn pack_dir(&self) -> PathBuf {
        self.git_dir.join("objects").join("pack")
    }

    /// Remove a loose object to simulate a damaged store.
    pub fn remove_object(&self, hash: &ObjectHash) {
        let hex = hash.as_str();
        std::fs::remove_file(self.git_dir.join("objects").join(&hex[..2]).join(&hex[2..])).unwrap();
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.temp.path().join("catalog")
    }

    /// Empty config file so the user's global configuration does not leak in.
    pub fn config_path(&self) -> PathBuf {
        let path = self.temp.path().join("objstat.toml");
        if !path.exists() {
            std::fs::write(&path, "[progress]\nenabled = false\n").unwrap();
        }
        path
    }

    fn persist(&self, hash: &ObjectHash) {
        let raw = self.objects.get(hash).unwrap();
        write_loose(&self.git_dir, hash, raw.kind.as_str(), &raw.data);
    }
}

pub fn write_loose(git_dir: &Path, hash: &ObjectHash, kind: &str, data: &[u8]) {
    let hex = hash.as_str();
    let dir = git_dir.join("objects").join(&hex[..2]);
    std::fs::create_dir_all(&dir).unwrap();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(format!("{} {}\0", kind, data.len()).as_bytes())
        .unwrap();
    encoder.write_all(data).unwrap();
    std::fs::write(dir.join(&hex[2..]), encoder.finish().unwrap()).unwrap();
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Version 2 index: sorted names, zeroed CRCs, 4-byte offsets.
fn index_v2(mut entries: Vec<(Vec<u8>, u32)>) -> Vec<u8> {
    entries.sort();
    let mut out = vec![0xff, b't', b'O', b'c'];
    out.extend_from_slice(&2u32.to_be_bytes());
    for byte in 0..256usize {
        let n = entries.iter().filter(|(name, _)| (name[0] as usize) <= byte).count() as u32;
        out.extend_from_slice(&n.to_be_bytes());
    }
    for (name, _) in &entries {
        out.extend_from_slice(name);
    }
    out.extend(std::iter::repeat(0u8).take(entries.len() * 4));
    for (_, offset) in &entries {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out
}

fn entry_header(kind: u8, size: usize) -> Vec<u8> {
    let mut size = size;
    let mut current = (kind << 4) | (size & 0x0f) as u8;
    size >>= 4;
    let mut out = Vec::new();
    while size > 0 {
        out.push(current | 0x80);
        current = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(current);
    out
}

fn base_distance(mut distance: u64) -> Vec<u8> {
    let mut bytes = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        bytes.push(0x80 | (distance & 0x7f) as u8);
        distance >>= 7;
    }
    bytes.reverse();
    bytes
}

fn size_varint(mut size: usize, out: &mut Vec<u8>) {
    loop {
        let byte = (size & 0x7f) as u8;
        size >>= 7;
        if size == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Delta that ignores its base and inserts `target` in chunks of at most 127 bytes.
fn insert_delta(base_len: usize, target: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();
    size_varint(base_len, &mut delta);
    size_varint(target.len(), &mut delta);
    for chunk in target.chunks(127) {
        delta.push(chunk.len() as u8);
        delta.extend_from_slice(chunk);
    }
    delta
}
