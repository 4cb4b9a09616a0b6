//! Configuration file handling.
//!
//! Loads `funnel.toml` and merges it with command-line arguments.

use anyhow::{Context, Result};
use funnel_pro::data::DEFAULT_STAGES;
use funnel_pro::{Metric, StageLayout, StageSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Args;

/// File looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "funnel.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stages: StagesConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Stage naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagesConfig {
    /// Stage names in funnel order, one per (count, tonnage) column pair.
    #[serde(default = "default_stage_names")]
    pub names: Vec<String>,

    /// `configured` or `header`.
    #[serde(default)]
    pub source: StageSource,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            names: default_stage_names(),
            source: StageSource::default(),
        }
    }
}

fn default_stage_names() -> Vec<String> {
    DEFAULT_STAGES.iter().map(|s| s.to_string()).collect()
}

/// Input file settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Worksheet to read from workbooks; the first sheet when unset.
    #[serde(default)]
    pub sheet: Option<String>,
}

/// Report settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub metric: Metric,

    #[serde(default)]
    pub normalize: bool,

    /// Directory exported CSV files are written to.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            metric: Metric::default(),
            normalize: false,
            export_dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `funnel.toml` from `dir` if present.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only explicitly given CLI values override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref names) = args.stages {
            self.stages.names = names.clone();
        }
        if let Some(source) = args.stage_source {
            self.stages.source = source;
        }
        if let Some(ref sheet) = args.sheet {
            self.input.sheet = Some(sheet.clone());
        }
        if let Some(metric) = args.metric {
            self.report.metric = metric;
        }
        if args.normalize {
            self.report.normalize = true;
        }
        if let Some(ref dir) = args.export_dir {
            self.report.export_dir = dir.clone();
        }
    }

    pub fn stage_layout(&self) -> StageLayout {
        StageLayout::new(self.stages.names.clone()).with_source(self.stages.source)
    }

    /// Default configuration as commented TOML.
    pub fn default_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())
            .context("Failed to serialize default configuration")?;
        Ok(format!(
            "# Funnel Pro configuration\n\
             # stages.names: one name per (count, tonnage) column pair, in funnel order\n\
             # stages.source: \"configured\" or \"header\" (read names from the first header row)\n\n\
             {body}"
        ))
    }
}
