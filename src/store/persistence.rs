//! Persistence layer for the object catalog

use crate::error::{StatsError, StorageError};
use crate::store::{
    Catalog, CatalogInfo, CatalogObject, ChildEntry, EdgeRecord, ObjectRecord, PLACEHOLDER_NAME,
};
use crate::types::{ObjectHash, ObjectId, ObjectKind};
use serde::{Deserialize, Serialize};
use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const META_TREE: &str = "meta";
const ACTIVE_GENERATION: &[u8] = b"active_generation";
const NEXT_GENERATION: &[u8] = b"next_generation";
const GENERATION_META_PREFIX: &str = "gen.";
const GENERATION_TREES: [&str; 5] = ["objects", "ids", "edges", "edge_keys", "parents"];

/// How long `open` waits for a previous handle on the same path to let go of its lock.
const LOCK_WAIT: Duration = Duration::from_secs(3);
const LOCK_POLL: Duration = Duration::from_millis(25);

/// Counters and timestamp of one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationMeta {
    next_id: ObjectId,
    next_edge_seq: u64,
    built_at: Option<String>,
}

impl GenerationMeta {
    fn fresh() -> Self {
        Self {
            next_id: 1,
            next_edge_seq: 0,
            built_at: None,
        }
    }
}

/// One complete, independently publishable set of catalog trees.
///
/// Layout:
/// - `objects.N`: hash -> ObjectRecord
/// - `ids.N`: id -> hash
/// - `edges.N`: parent ++ seq -> EdgeRecord (recorded order per parent)
/// - `edge_keys.N`: parent ++ child ++ name -> () (uniqueness)
/// - `parents.N`: child ++ parent -> () (reverse lookup)
#[derive(Clone)]
struct Generation {
    number: u64,
    objects: sled::Tree,
    ids: sled::Tree,
    edges: sled::Tree,
    edge_keys: sled::Tree,
    parents: sled::Tree,
}

impl Generation {
    fn open(db: &sled::Db, number: u64) -> Result<Self, StorageError> {
        Ok(Self {
            number,
            objects: db.open_tree(tree_name("objects", number))?,
            ids: db.open_tree(tree_name("ids", number))?,
            edges: db.open_tree(tree_name("edges", number))?,
            edge_keys: db.open_tree(tree_name("edge_keys", number))?,
            parents: db.open_tree(tree_name("parents", number))?,
        })
    }

    fn drop_trees(db: &sled::Db, number: u64) -> Result<(), StorageError> {
        for name in GENERATION_TREES {
            db.drop_tree(tree_name(name, number))?;
        }
        Ok(())
    }
}

fn tree_name(kind: &str, number: u64) -> String {
    format!("{}.{}", kind, number)
}

fn generation_meta_key(number: u64) -> String {
    format!("{}{}", GENERATION_META_PREFIX, number)
}

fn pair_key(a: u64, b: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&a.to_be_bytes());
    key[8..].copy_from_slice(&b.to_be_bytes());
    key
}

fn edge_identity_key(parent: ObjectId, child: ObjectId, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + name.len());
    key.extend_from_slice(&pair_key(parent, child));
    key.extend_from_slice(name.as_bytes());
    key
}

fn read_u64(bytes: &[u8]) -> Result<u64, StorageError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("expected 8-byte id, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

fn load_counters(meta: &sled::Tree, active: Option<u64>) -> Result<GenerationMeta, StorageError> {
    let Some(number) = active else {
        return Ok(GenerationMeta::fresh());
    };
    match meta.get(generation_meta_key(number))? {
        Some(bytes) => Ok(bincode::deserialize(&bytes)?),
        None => Err(StorageError::Corrupt(format!(
            "missing counters for generation {}",
            number
        ))),
    }
}

fn decode_hash(bytes: &[u8]) -> Result<ObjectHash, StorageError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::Corrupt(format!("hash is not UTF-8: {}", e)))?;
    ObjectHash::parse(text).map_err(|e| StorageError::Corrupt(e.to_string()))
}

/// Writes of the current run that are not yet published.
#[derive(Default)]
struct PendingWrites {
    objects: HashMap<ObjectHash, ObjectRecord>,
    hashes: BTreeMap<ObjectId, ObjectHash>,
    edges: BTreeMap<(ObjectId, u64), EdgeRecord>,
    edge_keys: HashSet<Vec<u8>>,
    /// (child, parent)
    parents: BTreeSet<(ObjectId, ObjectId)>,
}

impl PendingWrites {
    fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.edges.is_empty()
    }

    fn encode(&self) -> Result<EncodedWrites, StorageError> {
        let mut writes = EncodedWrites::default();
        for (hash, record) in &self.objects {
            writes
                .objects
                .push((hash.as_bytes().to_vec(), bincode::serialize(record)?));
        }
        for (id, hash) in &self.hashes {
            writes
                .ids
                .push((id.to_be_bytes().to_vec(), hash.as_bytes().to_vec()));
        }
        for ((parent, seq), edge) in &self.edges {
            writes
                .edges
                .push((pair_key(*parent, *seq).to_vec(), bincode::serialize(edge)?));
        }
        for key in &self.edge_keys {
            writes.edge_keys.push((key.clone(), Vec::new()));
        }
        for (child, parent) in &self.parents {
            writes
                .parents
                .push((pair_key(*child, *parent).to_vec(), Vec::new()));
        }
        Ok(writes)
    }
}

type KeyValues = Vec<(Vec<u8>, Vec<u8>)>;

#[derive(Default)]
struct EncodedWrites {
    objects: KeyValues,
    ids: KeyValues,
    edges: KeyValues,
    edge_keys: KeyValues,
    parents: KeyValues,
}

impl EncodedWrites {
    fn apply_batches(self, generation: &Generation) -> Result<(), StorageError> {
        generation.objects.apply_batch(to_batch(self.objects))?;
        generation.ids.apply_batch(to_batch(self.ids))?;
        generation.edges.apply_batch(to_batch(self.edges))?;
        generation.edge_keys.apply_batch(to_batch(self.edge_keys))?;
        generation.parents.apply_batch(to_batch(self.parents))?;
        Ok(())
    }
}

fn to_batch(entries: KeyValues) -> sled::Batch {
    let mut batch = sled::Batch::default();
    for (key, value) in entries {
        batch.insert(key, value);
    }
    batch
}

/// Open the sled database, waiting out a lock that a just-dropped handle has
/// not released yet. Sled frees the lock from its background flusher, so a
/// reopen in the same process can briefly race it.
fn open_db(path: &Path) -> Result<sled::Db, StorageError> {
    let deadline = Instant::now() + LOCK_WAIT;
    loop {
        match sled::open(path) {
            Err(sled::Error::Io(ref e)) if is_lock_contention(e) && Instant::now() < deadline => {
                debug!(path = %path.display(), "Catalog is locked; waiting");
                std::thread::sleep(LOCK_POLL);
            }
            result => return Ok(result?),
        }
    }
}

fn is_lock_contention(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::WouldBlock
        || error.to_string().contains("could not acquire lock")
}

/// Sled-based catalog.
///
/// All writes of a run are buffered in memory and published by [`SledCatalog::commit`].
/// A catalog dropped without commit leaves the published state untouched.
pub struct SledCatalog {
    db: sled::Db,
    path: PathBuf,
    meta: sled::Tree,
    base: Option<Generation>,
    counters: GenerationMeta,
    pending: PendingWrites,
    reset_pending: bool,
    name_substitutions: u64,
}

impl SledCatalog {
    /// Open (or create) the catalog database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        let db = open_db(&path)?;
        let meta = db.open_tree(META_TREE)?;

        let active = match meta.get(ACTIVE_GENERATION)? {
            Some(bytes) => Some(read_u64(&bytes)?),
            None => None,
        };
        let base = active.map(|n| Generation::open(&db, n)).transpose()?;
        let counters = load_counters(&meta, active)?;

        let catalog = Self {
            db,
            path,
            meta,
            base,
            counters,
            pending: PendingWrites::default(),
            reset_pending: false,
            name_substitutions: 0,
        };
        catalog.drop_stale_generations(active)?;
        Ok(catalog)
    }

    /// Open a catalog that must already hold a published generation.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self, StatsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StatsError::DatabaseMissing(path.to_path_buf()));
        }
        let catalog = Self::open(path)?;
        catalog.require_exists()?;
        Ok(catalog)
    }

    /// Fails with `DatabaseMissing` unless a catalog has been published.
    pub fn require_exists(&self) -> Result<(), StatsError> {
        if self.base.is_none() {
            return Err(StatsError::DatabaseMissing(self.path.clone()));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard the catalog. Reads immediately see an empty catalog; the old
    /// generation is only removed once the new one is committed.
    pub fn reset(&mut self) {
        self.pending = PendingWrites::default();
        self.counters = GenerationMeta::fresh();
        self.reset_pending = true;
    }

    /// Drop every buffered write, including a pending reset.
    pub fn rollback(&mut self) -> Result<(), StorageError> {
        self.pending = PendingWrites::default();
        self.reset_pending = false;
        self.counters = load_counters(&self.meta, self.base.as_ref().map(|g| g.number))?;
        Ok(())
    }

    /// Publish every buffered write. Returns the published generation number.
    pub fn commit(&mut self) -> Result<u64, StorageError> {
        let number = if self.reset_pending || self.base.is_none() {
            self.publish_new_generation()?
        } else {
            self.extend_generation()?
        };
        self.pending = PendingWrites::default();
        self.reset_pending = false;
        Ok(number)
    }

    /// Summary of the published catalog (pending writes excluded).
    pub fn info(&self) -> Result<CatalogInfo, StorageError> {
        let Some(generation) = &self.base else {
            return Ok(CatalogInfo::default());
        };
        let built_at = match self.meta.get(generation_meta_key(generation.number))? {
            Some(bytes) => bincode::deserialize::<GenerationMeta>(&bytes)?.built_at,
            None => None,
        };
        Ok(CatalogInfo {
            generation: Some(generation.number),
            objects: generation.objects.len() as u64,
            edges: generation.edges.len() as u64,
            built_at,
        })
    }

    fn visible(&self) -> Option<&Generation> {
        if self.reset_pending {
            None
        } else {
            self.base.as_ref()
        }
    }

    fn record(&self, hash: &ObjectHash) -> Result<Option<ObjectRecord>, StorageError> {
        if let Some(record) = self.pending.objects.get(hash) {
            return Ok(Some(*record));
        }
        match self.visible() {
            Some(generation) => match generation.objects.get(hash.as_bytes())? {
                Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn allocate_generation(&self) -> Result<u64, StorageError> {
        let next = match self.meta.get(NEXT_GENERATION)? {
            Some(bytes) => read_u64(&bytes)?,
            None => self.base.as_ref().map(|g| g.number + 1).unwrap_or(1),
        };
        self.meta
            .insert(NEXT_GENERATION, (next + 1).to_be_bytes().to_vec())?;
        Ok(next)
    }

    /// Write the working set into fresh trees, then switch the active pointer.
    fn publish_new_generation(&mut self) -> Result<u64, StorageError> {
        let number = self.allocate_generation()?;
        let generation = Generation::open(&self.db, number)?;

        self.pending.encode()?.apply_batches(&generation)?;

        self.counters.built_at = Some(chrono::Utc::now().to_rfc3339());
        self.meta.insert(
            generation_meta_key(number).as_bytes(),
            bincode::serialize(&self.counters)?,
        )?;
        self.db.flush()?;

        self.meta
            .insert(ACTIVE_GENERATION, number.to_be_bytes().to_vec())?;
        self.db.flush()?;

        if let Some(old) = self.base.take() {
            Generation::drop_trees(&self.db, old.number)?;
            self.meta.remove(generation_meta_key(old.number))?;
        }
        info!(generation = number, path = %self.path.display(), "Published catalog generation");
        self.base = Some(generation);
        Ok(number)
    }

    /// Apply the working set to the active generation in one transaction.
    fn extend_generation(&mut self) -> Result<u64, StorageError> {
        let generation = match &self.base {
            Some(generation) => generation.clone(),
            None => return self.publish_new_generation(),
        };
        if self.pending.is_empty() {
            return Ok(generation.number);
        }

        let writes = self.pending.encode()?;
        self.counters.built_at = Some(chrono::Utc::now().to_rfc3339());
        let meta_key = generation_meta_key(generation.number);
        let meta_value = bincode::serialize(&self.counters)?;

        let result: TransactionResult<(), ()> = (
            &generation.objects,
            &generation.ids,
            &generation.edges,
            &generation.edge_keys,
            &generation.parents,
            &self.meta,
        )
            .transaction(|(objects, ids, edges, edge_keys, parents, meta)| {
                for (key, value) in &writes.objects {
                    objects.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &writes.ids {
                    ids.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &writes.edges {
                    edges.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &writes.edge_keys {
                    edge_keys.insert(key.as_slice(), value.as_slice())?;
                }
                for (key, value) in &writes.parents {
                    parents.insert(key.as_slice(), value.as_slice())?;
                }
                meta.insert(meta_key.as_bytes(), meta_value.as_slice())?;
                Ok(())
            });
        result.map_err(|e| match e {
            TransactionError::Abort(()) => {
                StorageError::Corrupt("catalog transaction aborted".to_string())
            }
            TransactionError::Storage(e) => StorageError::Database(e),
        })?;
        self.db.flush()?;

        info!(
            generation = generation.number,
            objects = writes.objects.len(),
            edges = writes.edges.len(),
            "Extended catalog generation"
        );
        Ok(generation.number)
    }

    /// Remove trees of generations that were never published.
    fn drop_stale_generations(&self, active: Option<u64>) -> Result<(), StorageError> {
        let mut stale = BTreeSet::new();
        for name in self.db.tree_names() {
            let Ok(name) = std::str::from_utf8(&name) else {
                continue;
            };
            let Some((kind, number)) = name.split_once('.') else {
                continue;
            };
            if !GENERATION_TREES.contains(&kind) {
                continue;
            }
            if let Ok(number) = number.parse::<u64>() {
                if Some(number) != active {
                    stale.insert(number);
                }
            }
        }
        for number in stale {
            warn!(generation = number, "Dropping unpublished catalog generation");
            Generation::drop_trees(&self.db, number)?;
            self.meta.remove(generation_meta_key(number))?;
        }
        Ok(())
    }
}

impl Catalog for SledCatalog {
    fn lookup(&self, hash: &ObjectHash) -> Result<Option<ObjectId>, StorageError> {
        Ok(self.record(hash)?.map(|record| record.id))
    }

    fn insert_object(
        &mut self,
        hash: &ObjectHash,
        kind: ObjectKind,
        size: u64,
    ) -> Result<(ObjectId, bool), StorageError> {
        if let Some(existing) = self.record(hash)? {
            debug!(hash = %hash, "Object already present");
            return Ok((existing.id, false));
        }
        let id = self.counters.next_id;
        self.counters.next_id += 1;
        self.pending
            .objects
            .insert(hash.clone(), ObjectRecord { id, kind, size });
        self.pending.hashes.insert(id, hash.clone());
        Ok((id, true))
    }

    fn insert_edge(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        mode: u32,
        name: &[u8],
    ) -> Result<(), StorageError> {
        let name = match std::str::from_utf8(name) {
            Ok(name) => name,
            Err(e) => {
                if self.name_substitutions == 0 {
                    warn!(
                        parent,
                        child,
                        error = %e,
                        "Child name is not valid UTF-8; storing placeholder"
                    );
                } else {
                    debug!(parent, child, "Substituting placeholder for non-UTF-8 name");
                }
                self.name_substitutions += 1;
                PLACEHOLDER_NAME
            }
        };

        let key = edge_identity_key(parent, child, name);
        if self.pending.edge_keys.contains(&key) {
            return Ok(());
        }
        if let Some(generation) = self.visible() {
            if generation.edge_keys.contains_key(&key)? {
                return Ok(());
            }
        }

        let seq = self.counters.next_edge_seq;
        self.counters.next_edge_seq += 1;
        self.pending.edges.insert(
            (parent, seq),
            EdgeRecord {
                child,
                mode,
                name: name.to_string(),
            },
        );
        self.pending.edge_keys.insert(key);
        self.pending.parents.insert((child, parent));
        Ok(())
    }

    fn object(&self, id: ObjectId) -> Result<Option<CatalogObject>, StorageError> {
        let hash = match self.pending.hashes.get(&id) {
            Some(hash) => hash.clone(),
            None => match self.visible() {
                Some(generation) => match generation.ids.get(id.to_be_bytes())? {
                    Some(bytes) => decode_hash(&bytes)?,
                    None => return Ok(None),
                },
                None => return Ok(None),
            },
        };
        let record = self
            .record(&hash)?
            .ok_or_else(|| StorageError::Corrupt(format!("id {} maps to unknown hash {}", id, hash)))?;
        Ok(Some(CatalogObject {
            id: record.id,
            hash,
            kind: record.kind,
            size: record.size,
        }))
    }

    fn children(&self, parent: ObjectId) -> Result<Vec<ChildEntry>, StorageError> {
        let mut edges = Vec::new();
        if let Some(generation) = self.visible() {
            for item in generation.edges.scan_prefix(parent.to_be_bytes()) {
                let (_, value) = item?;
                edges.push(bincode::deserialize::<EdgeRecord>(&value)?);
            }
        }
        edges.extend(
            self.pending
                .edges
                .range((parent, 0)..=(parent, u64::MAX))
                .map(|(_, edge)| edge.clone()),
        );

        edges
            .into_iter()
            .map(|edge| {
                let object = self.object(edge.child)?.ok_or_else(|| {
                    StorageError::Corrupt(format!("edge to unknown id {}", edge.child))
                })?;
                Ok(ChildEntry {
                    object,
                    mode: edge.mode,
                    name: edge.name,
                })
            })
            .collect()
    }

    fn parents(&self, child: ObjectId) -> Result<Vec<ObjectId>, StorageError> {
        let mut parents = BTreeSet::new();
        if let Some(generation) = self.visible() {
            for item in generation.parents.scan_prefix(child.to_be_bytes()) {
                let (key, _) = item?;
                parents.insert(read_u64(&key[8..])?);
            }
        }
        parents.extend(
            self.pending
                .parents
                .range((child, 0)..=(child, u64::MAX))
                .map(|(_, parent)| *parent),
        );
        Ok(parents.into_iter().collect())
    }

    fn child_counts(&self) -> Result<Vec<(ObjectId, u64)>, StorageError> {
        let mut counts: BTreeMap<ObjectId, u64> = BTreeMap::new();
        if let Some(generation) = self.visible() {
            for item in generation.edges.iter() {
                let (key, _) = item?;
                *counts.entry(read_u64(&key[..8])?).or_default() += 1;
            }
        }
        for (parent, _) in self.pending.edges.keys() {
            *counts.entry(*parent).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
