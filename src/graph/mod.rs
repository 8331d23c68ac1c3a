//! Object graph traversal
//!
//! Two walks over the content-addressed DAG:
//! - [`GraphWalker`] pulls objects from a source and records them in the catalog,
//!   fetching each distinct object once no matter how often it is referenced.
//! - [`LinearStatsWalker`] replays the catalog below one root as a virtual
//!   concatenation of its blobs, which [`LayoutReport`] summarises.

pub mod layout;
pub mod walker;

pub use layout::{LayoutEntry, LayoutReport, LayoutRow, LinearStatsWalker};
pub use walker::{Discovery, GraphWalker, WalkEvent, WalkStats};
