//! CLI route: single route table and run context. Dispatches to the catalog API and presentation.

use crate::api::StatsApi;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_add_outcome_json, format_add_outcome_text, format_config, format_heavy_parents_json,
    format_heavy_parents_text, format_layout_json, format_layout_text, format_parents_json,
    format_parents_text, format_rebuild_summary_json, format_rebuild_summary_text,
    format_status_json, format_status_text, format_subtree_histogram_json,
    format_subtree_histogram_text, format_subtree_sizes_json, format_subtree_sizes_text,
};
use crate::config::{BaselineSource, ConfigLoader, ObjstatConfig};
use crate::error::StatsError;
use crate::progress::ProgressMeter;
use crate::source::{
    resolve_git_dir, BaselineSet, EmptyBaseline, HashSetBaseline, PackIndexBaseline,
    RepoObjectSource, RepoRootProvider,
};
use crate::store::SledCatalog;
use crate::types::ObjectHash;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PROGRESS_LABEL: &str = "Traversing objects";

/// Runtime context for CLI execution: repository, catalog location and configuration.
pub struct RunContext {
    config: ObjstatConfig,
    repository: PathBuf,
    git_dir: Option<PathBuf>,
    catalog_path: PathBuf,
    quiet: bool,
}

impl RunContext {
    /// Load configuration and locate the repository and catalog.
    ///
    /// The repository is only required when no catalog path is configured;
    /// commands that read objects check for it again.
    pub fn new(
        repository: Option<PathBuf>,
        config_path: Option<PathBuf>,
        catalog_override: Option<PathBuf>,
        quiet: bool,
    ) -> Result<Self, StatsError> {
        let lookup_root = repository.clone().unwrap_or_else(|| PathBuf::from("."));
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&lookup_root)?,
        };
        if let Err(errors) = config.validate() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(StatsError::ConfigError(messages.join("; ")));
        }

        let repository = repository.unwrap_or_else(|| config.repository.clone());
        let git_dir = match resolve_git_dir(&repository) {
            Ok(dir) => Some(dir),
            Err(e) => {
                debug!(repository = %repository.display(), error = %e, "No git directory");
                None
            }
        };

        let catalog_path = match (catalog_override, &git_dir) {
            (Some(path), _) => path,
            (None, Some(dir)) => config.storage.resolve_catalog_path(dir),
            (None, None) => match &config.storage.catalog_path {
                Some(path) if path.is_absolute() => path.clone(),
                _ => {
                    return Err(StatsError::Repository(format!(
                        "{} is not a git repository and no catalog path is configured",
                        repository.display()
                    )))
                }
            },
        };

        Ok(Self {
            config,
            repository,
            git_dir,
            catalog_path,
            quiet,
        })
    }

    pub fn config(&self) -> &ObjstatConfig {
        &self.config
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn execute(&self, command: &Commands) -> Result<String, StatsError> {
        match command {
            Commands::Rebuild { yes, format } => self.handle_rebuild(*yes, format),
            Commands::Add { hash, format } => self.handle_add(hash, format),
            Commands::Layout {
                hash,
                details,
                no_baseline,
                baseline_file,
                format,
            } => self.handle_layout(hash, *details, *no_baseline, baseline_file.as_deref(), format),
            Commands::Parents { hash, format } => self.handle_parents(hash, format),
            Commands::Subtrees {
                top,
                histogram,
                min_children,
                format,
            } => self.handle_subtrees(*top, *histogram, *min_children, format),
            Commands::Status { format } => self.handle_status(format),
            Commands::Config { format } => format_config(&self.config, format),
        }
    }

    fn require_git_dir(&self) -> Result<&Path, StatsError> {
        self.git_dir.as_deref().ok_or_else(|| {
            StatsError::Repository(format!(
                "{} is not a git repository",
                self.repository.display()
            ))
        })
    }

    fn progress_meter(&self) -> ProgressMeter {
        let enabled = self.config.progress.enabled && !self.quiet && std::io::stderr().is_terminal();
        ProgressMeter::stderr(
            PROGRESS_LABEL,
            enabled,
            Duration::from_millis(self.config.progress.interval_ms),
        )
    }

    fn handle_rebuild(&self, yes: bool, format: &str) -> Result<String, StatsError> {
        let git_dir = self.require_git_dir()?;
        let catalog = SledCatalog::open(&self.catalog_path)?;

        let existing = catalog.info()?;
        if existing.generation.is_some() && !yes && std::io::stdin().is_terminal() {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Discard the catalog at {} ({} objects) and rebuild it?",
                    self.catalog_path.display(),
                    existing.objects
                ))
                .default(false)
                .interact()
                .map_err(|e| StatsError::ConfigError(format!("Failed to get user input: {}", e)))?;
            if !confirmed {
                return Ok("Rebuild cancelled".to_string());
            }
        }

        let source = RepoObjectSource::open(git_dir)?;
        let provider = RepoRootProvider::new(git_dir, &source);
        let mut api = StatsApi::new(catalog);
        let mut meter = self.progress_meter();
        let summary = api.rebuild(&source, &provider, &mut meter)?;
        info!(generation = summary.generation, "Rebuild complete");

        match format {
            "json" => Ok(format_rebuild_summary_json(&summary)),
            _ => Ok(format_rebuild_summary_text(&summary)),
        }
    }

    fn handle_add(&self, hash: &str, format: &str) -> Result<String, StatsError> {
        let hash = ObjectHash::parse(hash)?;
        let git_dir = self.require_git_dir()?;
        let source = RepoObjectSource::open(git_dir)?;
        let mut api = StatsApi::new(SledCatalog::open(&self.catalog_path)?);
        let mut meter = self.progress_meter();
        let outcome = api.add(&source, &hash, &mut meter)?;

        match format {
            "json" => Ok(format_add_outcome_json(&outcome)),
            _ => Ok(format_add_outcome_text(&outcome)),
        }
    }

    fn handle_layout(
        &self,
        hash: &str,
        details: bool,
        no_baseline: bool,
        baseline_file: Option<&Path>,
        format: &str,
    ) -> Result<String, StatsError> {
        let hash = ObjectHash::parse(hash)?;
        let api = StatsApi::new(SledCatalog::open_existing(&self.catalog_path)?);
        let baseline = self.load_baseline(no_baseline, baseline_file)?;
        let report = api.layout(&hash, &*baseline, details)?;

        match format {
            "json" => Ok(format_layout_json(&report)),
            _ => Ok(format_layout_text(&report)),
        }
    }

    fn load_baseline(
        &self,
        no_baseline: bool,
        baseline_file: Option<&Path>,
    ) -> Result<Box<dyn BaselineSet>, StatsError> {
        if no_baseline {
            return Ok(Box::new(EmptyBaseline));
        }
        if let Some(path) = baseline_file {
            return Ok(Box::new(HashSetBaseline::load_file(path)?));
        }
        match self.config.baseline.source {
            BaselineSource::Pack => Ok(Box::new(PackIndexBaseline::load(self.require_git_dir()?)?)),
            BaselineSource::File => {
                let path = self.config.baseline.file.as_deref().ok_or_else(|| {
                    StatsError::ConfigError("baseline.source = \"file\" requires baseline.file".to_string())
                })?;
                Ok(Box::new(HashSetBaseline::load_file(path)?))
            }
            BaselineSource::Disabled => Ok(Box::new(EmptyBaseline)),
        }
    }

    fn handle_parents(&self, hash: &str, format: &str) -> Result<String, StatsError> {
        let hash = ObjectHash::parse(hash)?;
        let api = StatsApi::new(SledCatalog::open_existing(&self.catalog_path)?);
        let parents = api.parents_of(&hash)?;

        match format {
            "json" => Ok(format_parents_json(&hash, &parents)),
            _ => Ok(format_parents_text(&hash, &parents)),
        }
    }

    fn handle_subtrees(
        &self,
        top: Option<usize>,
        histogram: bool,
        min_children: Option<u64>,
        format: &str,
    ) -> Result<String, StatsError> {
        let api = StatsApi::new(SledCatalog::open_existing(&self.catalog_path)?);
        if histogram {
            let buckets = api.subtree_histogram()?;
            return match format {
                "json" => Ok(format_subtree_histogram_json(&buckets)),
                _ => Ok(format_subtree_histogram_text(&buckets)),
            };
        }
        if let Some(min_children) = min_children {
            let heavy = api.heavy_parents(min_children)?;
            return match format {
                "json" => Ok(format_heavy_parents_json(min_children, &heavy)),
                _ => Ok(format_heavy_parents_text(min_children, &heavy)),
            };
        }

        let mut sizes = api.subtree_sizes()?;
        if let Some(top) = top {
            let skip = sizes.len().saturating_sub(top);
            sizes.drain(..skip);
        }

        match format {
            "json" => Ok(format_subtree_sizes_json(&sizes)),
            _ => Ok(format_subtree_sizes_text(&sizes)),
        }
    }

    fn handle_status(&self, format: &str) -> Result<String, StatsError> {
        let info = if self.catalog_path.exists() {
            StatsApi::new(SledCatalog::open(&self.catalog_path)?).status()?
        } else {
            Default::default()
        };

        match format {
            "json" => Ok(format_status_json(&self.catalog_path, &info)),
            _ => Ok(format_status_text(&self.catalog_path, &info)),
        }
    }
}
