//! Catalog command presentation: rebuild, add, parents, subtrees, status, config.

use super::{format_section_heading, to_pretty_json};
use crate::api::{AddOutcome, FanoutBucket, RebuildSummary, SubtreeSize};
use crate::config::ObjstatConfig;
use crate::error::StatsError;
use crate::graph::WalkStats;
use crate::store::CatalogInfo;
use crate::types::ObjectHash;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::path::Path;

fn describe_stats(stats: &WalkStats) -> String {
    let mut out = format!(
        "{} objects ({} commits, {} trees, {} blobs), {} bytes",
        stats.discovered, stats.commits, stats.trees, stats.blobs, stats.bytes
    );
    if stats.failed > 0 {
        out.push_str(&format!(
            "\nSkipped {} unreadable object(s); see the log for details.",
            stats.failed
        ));
    }
    if stats.gitlinks > 0 {
        out.push_str(&format!(
            "\nRecorded {} submodule commit(s) without reading them.",
            stats.gitlinks
        ));
    }
    out
}

pub fn format_rebuild_summary_text(summary: &RebuildSummary) -> String {
    format!(
        "Catalogued {} from {} root(s) in {} ref(s).\nPublished generation {}.",
        describe_stats(&summary.stats),
        summary.roots,
        summary.root_sets,
        summary.generation
    )
}

pub fn format_rebuild_summary_json(summary: &RebuildSummary) -> String {
    to_pretty_json(&json!(summary))
}

pub fn format_add_outcome_text(outcome: &AddOutcome) -> String {
    match outcome {
        AddOutcome::AlreadyPresent { hash } => format!("{} is already in the catalog.", hash),
        AddOutcome::Added {
            hash,
            generation,
            stats,
        } => format!(
            "Added {}: {}.\nPublished generation {}.",
            hash,
            describe_stats(stats),
            generation
        ),
    }
}

pub fn format_add_outcome_json(outcome: &AddOutcome) -> String {
    to_pretty_json(&json!(outcome))
}

pub fn format_parents_text(hash: &ObjectHash, parents: &[ObjectHash]) -> String {
    let mut out = format!("Parents of {}:\n", hash);
    if parents.is_empty() {
        out.push_str("  (none: only referenced as a root)\n");
    }
    for parent in parents {
        out.push_str(&format!("  {}\n", parent));
    }
    out
}

pub fn format_parents_json(hash: &ObjectHash, parents: &[ObjectHash]) -> String {
    to_pretty_json(&json!({ "hash": hash, "parents": parents, "total": parents.len() }))
}

pub fn format_subtree_sizes_text(sizes: &[SubtreeSize]) -> String {
    let mut out = String::from("Tree sizes:\n");
    for size in sizes {
        out.push_str(&format!("{} {}\n", size.hash, size.children));
    }
    out
}

pub fn format_subtree_sizes_json(sizes: &[SubtreeSize]) -> String {
    to_pretty_json(&json!({ "subtrees": sizes, "total": sizes.len() }))
}

pub fn format_subtree_histogram_text(buckets: &[FanoutBucket]) -> String {
    let mut out = String::from("Tree fan-out:\n");
    for bucket in buckets {
        out.push_str(&format!(
            "{} trees with {} nodes\n",
            bucket.parents, bucket.children
        ));
    }
    out
}

pub fn format_subtree_histogram_json(buckets: &[FanoutBucket]) -> String {
    let parents: u64 = buckets.iter().map(|b| b.parents).sum();
    to_pretty_json(&json!({ "histogram": buckets, "parents": parents }))
}

pub fn format_heavy_parents_text(min_children: u64, sizes: &[SubtreeSize]) -> String {
    if sizes.is_empty() {
        return format!("No tree has {} or more children.\n", min_children);
    }
    let mut out = format!("Trees with at least {} children:\n", min_children);
    for size in sizes {
        out.push_str(&format!("{} {}\n", size.hash, size.children));
    }
    out
}

pub fn format_heavy_parents_json(min_children: u64, sizes: &[SubtreeSize]) -> String {
    to_pretty_json(&json!({
        "min_children": min_children,
        "subtrees": sizes,
        "total": sizes.len(),
    }))
}

pub fn format_status_text(catalog_path: &Path, info: &CatalogInfo) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Catalog Status"));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["Path".to_string(), catalog_path.display().to_string()]);
    match info.generation {
        Some(generation) => {
            table.add_row(vec!["Generation".to_string(), generation.to_string()]);
            table.add_row(vec!["Objects".to_string(), info.objects.to_string()]);
            table.add_row(vec!["References".to_string(), info.edges.to_string()]);
            table.add_row(vec![
                "Built at".to_string(),
                info.built_at.clone().unwrap_or_else(|| "unknown".to_string()),
            ]);
        }
        None => {
            table.add_row(vec![
                "Generation".to_string(),
                "none (run `objstat rebuild`)".to_string(),
            ]);
        }
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_status_json(catalog_path: &Path, info: &CatalogInfo) -> String {
    to_pretty_json(&json!({
        "path": catalog_path,
        "generation": info.generation,
        "objects": info.objects,
        "edges": info.edges,
        "built_at": info.built_at,
    }))
}

pub fn format_config(config: &ObjstatConfig, format: &str) -> Result<String, StatsError> {
    match format {
        "json" => serde_json::to_string_pretty(config)
            .map_err(|e| StatsError::ConfigError(format!("Failed to serialize config: {}", e))),
        "toml" => toml::to_string_pretty(config)
            .map_err(|e| StatsError::ConfigError(format!("Failed to serialize config: {}", e))),
        other => Err(StatsError::ConfigError(format!(
            "Unknown format '{}' (must be 'toml' or 'json')",
            other
        ))),
    }
}
