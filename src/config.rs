use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Project metadata referenced by punch records through their alias.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    pub name: String,
    pub hourly_rate: f64,
}

/// Explicit configuration value passed into the punch entity, the store and
/// the migrator. There is no global config singleton; tests inject fixtures
/// directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub punch_directory: Option<PathBuf>,
    pub projects: HashMap<String, ProjectConfig>,
}

impl Config {
    pub fn config_file(application_data_path: &Path) -> PathBuf {
        application_data_path.join("punchlog.json")
    }

    /// Loads the JSON config, falling back to defaults when the file does
    /// not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {path:?}"))
    }

    /// Configured hourly rate for a project alias, 0 when the alias or its
    /// rate is unknown. Looked up once at punch construction and at the
    /// v2 to v3 rate backfill, never re-evaluated afterwards.
    pub fn hourly_rate(&self, alias: &str) -> f64 {
        self.projects
            .get(alias)
            .map(|project| project.hourly_rate)
            .unwrap_or(0.0)
    }

    /// Display name for a project alias. Unknown aliases are reported as the
    /// raw label.
    pub fn project_name<'a>(&'a self, alias: &'a str) -> &'a str {
        self.projects
            .get(alias)
            .filter(|project| !project.name.is_empty())
            .map(|project| project.name.as_str())
            .unwrap_or(alias)
    }

    /// Test fixture helper.
    pub fn with_project(mut self, alias: &str, name: &str, hourly_rate: f64) -> Self {
        self.projects.insert(
            alias.to_string(),
            ProjectConfig {
                name: name.to_string(),
                hourly_rate,
            },
        );
        self
    }
}
