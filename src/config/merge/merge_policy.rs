//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("repository", ".")?
        .set_default("progress.enabled", true)?
        .set_default("progress.interval_ms", 100)?
        .set_default("baseline.source", "pack")
}
