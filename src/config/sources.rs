//! Configuration file sources.

pub mod global_file;
pub mod repository_file;
