//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to the catalog API.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, LogArgs};
pub use presentation::{
    format_add_outcome_json, format_add_outcome_text, format_config, format_layout_json,
    format_layout_text, format_parents_json, format_parents_text, format_rebuild_summary_json,
    format_rebuild_summary_text, format_status_json, format_status_text,
    format_subtree_sizes_json, format_subtree_sizes_text,
};
pub use route::RunContext;
