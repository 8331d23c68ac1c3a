//! Layout report presentation: detail rows and the blob/tree summary.

use super::{format_section_heading, to_pretty_json};
use crate::graph::LayoutReport;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::{CellAlignment, Table};
use serde_json::json;

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

fn average(value: Option<f64>) -> String {
    or_dash(value.map(|v| format!("{:.3}", v)))
}

pub fn format_layout_text(report: &LayoutReport) -> String {
    let mut out = String::new();
    if let Some(root) = &report.root {
        out.push_str(&format!("{}\n", format_section_heading(&format!("Layout of {}", root))));
    }

    if !report.rows.is_empty() {
        out.push('\n');
        out.push_str(&format!(
            "{:>12}  {:<40}  {:>10}  {:>12}  {:<6}  {:>5}  {}\n",
            "cumulative", "hash", "size", "offset", "kind", "depth", "name"
        ));
        for row in &report.rows {
            let entry = &row.entry;
            out.push_str(&format!(
                "{:>12}  {:<40}  {:>10}  {:>12}  {:<6}  {:>5}  {}{}\n",
                entry.cumulative,
                entry.hash,
                entry.size,
                entry.offset,
                entry.kind,
                entry.depth,
                entry.name,
                if row.is_new { "" } else { "  (dedup)" }
            ));
        }
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["", "Blobs", "Trees"]);
    table.add_row(vec![
        "Total bytes".to_string(),
        report.total_bytes.to_string(),
        "-".to_string(),
    ]);
    table.add_row(vec![
        "New bytes".to_string(),
        report.new_blob_bytes.to_string(),
        report.new_tree_bytes.to_string(),
    ]);
    table.add_row(vec![
        "Deduplicated bytes".to_string(),
        report.deduplicated_bytes().to_string(),
        "-".to_string(),
    ]);
    table.add_row(vec![
        "New objects".to_string(),
        report.new_blob_count.to_string(),
        report.new_tree_count.to_string(),
    ]);
    table.add_row(vec![
        "Average new size".to_string(),
        average(report.avg_new_blob_size()),
        average(report.avg_new_tree_size()),
    ]);
    table.add_row(vec![
        "Smallest blob".to_string(),
        or_dash(report.min_blob_size.map(|v| v.to_string())),
        "-".to_string(),
    ]);
    for column in 1..=2 {
        if let Some(column) = table.column_mut(column) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }

    out.push('\n');
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_layout_json(report: &LayoutReport) -> String {
    let out = json!({
        "root": report.root,
        "blobs": {
            "total_bytes": report.total_bytes,
            "min_size": report.min_blob_size,
            "new_count": report.new_blob_count,
            "new_bytes": report.new_blob_bytes,
            "deduplicated_bytes": report.deduplicated_bytes(),
            "avg_new_size": report.avg_new_blob_size(),
        },
        "trees": {
            "new_count": report.new_tree_count,
            "new_bytes": report.new_tree_bytes,
            "avg_new_size": report.avg_new_tree_size(),
        },
        "rows": report.rows,
    });
    to_pretty_json(&out)
}
