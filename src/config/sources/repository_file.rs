//! Repository config file source: <repository>/objstat.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

pub const REPOSITORY_CONFIG_FILE: &str = "objstat.toml";

/// Add the repository's config file to builder if present.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    repository_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = repository_root.join(REPOSITORY_CONFIG_FILE);
    if path.exists() {
        return Ok(builder.add_source(File::from(path).required(false)));
    }
    Ok(builder)
}
