//! Objstat CLI Binary
//!
//! Command-line interface for cataloguing a git object store and reporting on it.

use clap::Parser;
use objstat::cli::{Cli, LogArgs, RunContext};
use objstat::config::ConfigLoader;
use objstat::logging::{init_logging, LoggingConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("objstat starting");

    let context = match RunContext::new(
        cli.repo.clone(),
        cli.config.clone(),
        cli.catalog.clone(),
        cli.quiet,
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing: {}", e);
            eprintln!("{}", objstat::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", objstat::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = match cli.config {
        Some(ref config_path) => ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default(),
        None => {
            let root = cli.repo.clone().unwrap_or_else(|| PathBuf::from("."));
            ConfigLoader::load(&root)
                .ok()
                .map(|c| c.logging)
                .unwrap_or_default()
        }
    };

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    apply_log_args(&mut config, &cli.logging);
    config
}

fn apply_log_args(config: &mut LoggingConfig, args: &LogArgs) {
    if let Some(level) = &args.level {
        config.level = level.clone();
    }
    if let Some(format) = &args.format {
        config.format = format.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if let Some(file) = &args.file {
        config.file = Some(file.clone());
    }
}
