//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::StatsError;

/// Map domain errors to the message printed on stderr.
pub fn map_error(e: &StatsError) -> String {
    match e {
        StatsError::DatabaseMissing(path) => format!(
            "No catalog at {}. Run `objstat rebuild` first.",
            path.display()
        ),
        StatsError::HashNotFound(hash) => format!(
            "{} is not in the catalog. Run `objstat add {}` to catalogue it.",
            hash, hash
        ),
        other => other.to_string(),
    }
}
