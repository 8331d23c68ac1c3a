//! Config loader facade: builds the layered configuration.

use crate::config::merge::merge_policy;
use crate::config::sources::{global_file, repository_file};
use crate::config::ObjstatConfig;
use crate::error::StatsError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the repository at `repository_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, repository
    /// `objstat.toml`, `OBJSTAT__*` environment variables.
    pub fn load(repository_root: &Path) -> Result<ObjstatConfig, StatsError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = repository_file::add_to_builder(builder, repository_root)?;
        let builder = builder.add_source(Environment::with_prefix("OBJSTAT").separator("__"));

        let config: ObjstatConfig = builder.build()?.try_deserialize()?;
        debug!(repository = %repository_root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from one explicit file (defaults still apply).
    pub fn load_from_file(path: &Path) -> Result<ObjstatConfig, StatsError> {
        if !path.exists() {
            return Err(StatsError::ConfigError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        Ok(builder.build()?.try_deserialize()?)
    }
}
