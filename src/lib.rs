//! Objstat: Object Graph Statistics
//!
//! Catalogues every object reachable from the refs of a content-addressed
//! store (blobs, trees, commits) and answers size, layout and deduplication
//! questions about it.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod progress;
pub mod source;
pub mod store;
pub mod types;
