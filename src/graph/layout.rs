//! Linear layout of a catalogued root.
//!
//! Lays the blobs below a root end to end, in recorded child order, as if they
//! were concatenated into one stream. Trees appear as zero-length boundary
//! markers. The cumulative total is monotone over the whole root; the offset
//! column is local to each tree level.

use crate::error::StorageError;
use crate::source::BaselineSet;
use crate::store::{Catalog, ChildEntry};
use crate::types::{ObjectHash, ObjectId, ObjectKind};
use serde::Serialize;
use std::collections::HashSet;

/// One row of the layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutEntry {
    /// Bytes of blobs laid out so far, this entry included.
    pub cumulative: u64,
    pub hash: ObjectHash,
    pub size: u64,
    /// Offset of this entry within its own tree level.
    pub offset: u64,
    pub kind: ObjectKind,
    pub depth: usize,
    pub name: String,
}

struct Frame {
    children: std::vec::IntoIter<ChildEntry>,
    offset: u64,
    depth: usize,
}

/// Pre-order iterator over the layout below one catalogued object.
pub struct LinearStatsWalker<'a, C: Catalog> {
    catalog: &'a C,
    stack: Vec<Frame>,
    cumulative: u64,
}

impl<'a, C: Catalog> LinearStatsWalker<'a, C> {
    pub fn new(
        catalog: &'a C,
        root: ObjectId,
        starting_offset: u64,
        depth: usize,
    ) -> Result<Self, StorageError> {
        let children = catalog.children(root)?;
        Ok(Self {
            catalog,
            stack: vec![Frame {
                children: children.into_iter(),
                offset: starting_offset,
                depth,
            }],
            cumulative: 0,
        })
    }

    /// Blob bytes laid out so far.
    pub fn cumulative(&self) -> u64 {
        self.cumulative
    }
}

impl<C: Catalog> Iterator for LinearStatsWalker<'_, C> {
    type Item = Result<LayoutEntry, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(child) = frame.children.next() else {
                self.stack.pop();
                continue;
            };

            let offset = frame.offset;
            let depth = frame.depth;
            let object = child.object;

            if object.kind == ObjectKind::Blob {
                self.cumulative += object.size;
                frame.offset += object.size;
            } else {
                let grandchildren = match self.catalog.children(object.id) {
                    Ok(children) => children,
                    Err(e) => return Some(Err(e)),
                };
                self.stack.push(Frame {
                    children: grandchildren.into_iter(),
                    offset,
                    depth: depth + 1,
                });
            }

            return Some(Ok(LayoutEntry {
                cumulative: self.cumulative,
                hash: object.hash,
                size: object.size,
                offset,
                kind: object.kind,
                depth,
                name: child.name,
            }));
        }
    }
}

/// A layout row annotated with its dedup status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutRow {
    #[serde(flatten)]
    pub entry: LayoutEntry,
    /// Absent from the baseline and not seen earlier in this report.
    pub is_new: bool,
}

/// Size and dedup summary of one root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutReport {
    pub root: Option<ObjectHash>,
    /// Sum of all blob sizes in the layout.
    pub total_bytes: u64,
    /// Smallest non-zero blob size.
    pub min_blob_size: Option<u64>,
    pub new_blob_count: u64,
    pub new_blob_bytes: u64,
    pub new_tree_count: u64,
    pub new_tree_bytes: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<LayoutRow>,
}

impl LayoutReport {
    /// Consume a layout and summarise it against `baseline`.
    ///
    /// Every hash counts as new at most once per report.
    pub fn collect<I, B>(entries: I, baseline: &B, keep_rows: bool) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = Result<LayoutEntry, StorageError>>,
        B: BaselineSet + ?Sized,
    {
        let mut report = LayoutReport::default();
        let mut seen: HashSet<ObjectHash> = HashSet::new();

        for entry in entries {
            let entry = entry?;
            if entry.kind == ObjectKind::Blob {
                report.total_bytes += entry.size;
                if entry.size > 0 {
                    report.min_blob_size = Some(
                        report
                            .min_blob_size
                            .map_or(entry.size, |min| min.min(entry.size)),
                    );
                }
            }

            let is_new = !baseline.contains(&entry.hash) && seen.insert(entry.hash.clone());
            if is_new {
                match entry.kind {
                    ObjectKind::Blob => {
                        report.new_blob_count += 1;
                        report.new_blob_bytes += entry.size;
                    }
                    ObjectKind::Tree => {
                        report.new_tree_count += 1;
                        report.new_tree_bytes += entry.size;
                    }
                    ObjectKind::Commit => {}
                }
            }

            if keep_rows {
                report.rows.push(LayoutRow { entry, is_new });
            }
        }
        Ok(report)
    }

    /// Bytes of blobs already covered by the baseline or repeated in this layout.
    pub fn deduplicated_bytes(&self) -> u64 {
        self.total_bytes - self.new_blob_bytes
    }

    pub fn avg_new_blob_size(&self) -> Option<f64> {
        average(self.new_blob_bytes, self.new_blob_count)
    }

    pub fn avg_new_tree_size(&self) -> Option<f64> {
        average(self.new_tree_bytes, self.new_tree_count)
    }
}

fn average(bytes: u64, count: u64) -> Option<f64> {
    (count > 0).then(|| bytes as f64 / count as f64)
}
