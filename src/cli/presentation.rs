//! CLI presentation: text and json formatters per command family.

mod catalog;
mod layout;

pub use catalog::{
    format_add_outcome_json, format_add_outcome_text, format_config, format_heavy_parents_json,
    format_heavy_parents_text, format_parents_json, format_parents_text,
    format_rebuild_summary_json, format_rebuild_summary_text, format_status_json,
    format_status_text, format_subtree_histogram_json, format_subtree_histogram_text,
    format_subtree_sizes_json, format_subtree_sizes_text,
};
pub use layout::{format_layout_json, format_layout_text};

use owo_colors::OwoColorize;

/// Format a section heading with bold/underline.
pub(crate) fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub(crate) fn to_pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
