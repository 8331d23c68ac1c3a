//! Integration tests for objstat

mod catalog_scenarios;
mod cli_commands;
mod config_integration;
mod test_utils;
mod walk_properties;
