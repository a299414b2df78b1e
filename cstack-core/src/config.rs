//! Configuration file loading.
//!
//! The configuration is a YAML file listing the known compose stacks. The
//! path is resolved from, in order: an explicit CLI override, the
//! `CSTACK_CONFIG` environment variable, and the default
//! `~/compose-stack.yaml`.

use crate::error::{CstackError, Result};
use crate::registry::{StackDefinition, StackRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "CSTACK_CONFIG";

/// Default configuration file path, relative to the home directory.
pub const DEFAULT_CONFIG_NAME: &str = "compose-stack.yaml";

/// Starter configuration printed by `cstack config --template`.
pub const CONFIG_TEMPLATE: &str = "\
# compose-stack.yaml
#
# engine: argv prefix of the compose engine (default: docker compose)
# stacks: ordered list of managed compose stacks
#   name:    unique stack name
#   path:    compose file path; relative paths resolve against this file's
#            directory; default: services/<name>/compose.yml
#   ignored: exclude from --all selection (default: false)

engine: [docker, compose]
stacks:
  - name: website
    path: ~/website/compose.yaml
  - name: smarthome
    path: /opt/smarthome/compose.yaml
  - name: nextcloud
    path: /data/nextcloud/compose.yaml
    ignored: true
";

/// One stack entry as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackEntry {
    /// Unique stack name.
    pub name: String,
    /// Compose file path; defaults to `services/<name>/compose.yml`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Excluded from `--all` selection when set.
    #[serde(default)]
    pub ignored: bool,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compose engine argv prefix, e.g. `[docker, compose]`.
    pub engine: Vec<String>,
    /// Managed stacks, in file order. This order is the canonical report order.
    pub stacks: Vec<StackEntry>,
    /// Directory of the loaded configuration file; relative stack paths
    /// resolve against it. Not part of the file itself.
    #[serde(skip)]
    root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: vec!["docker".to_string(), "compose".to_string()],
            stacks: Vec::new(),
            root: PathBuf::new(),
        }
    }
}

impl Config {
    /// Resolve the configuration file path from an optional CLI override.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_path {
            return expand_home(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return expand_home(Path::new(&env_path));
        }
        dirs::home_dir().unwrap_or_default().join(DEFAULT_CONFIG_NAME)
    }

    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CstackError::ConfigNotFound {
                path: path.to_path_buf(),
                hint: format!(
                    "Set {} or pass --config, or create one with `cstack config --template`.",
                    CONFIG_ENV
                ),
            });
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CstackError::IoError { path: path.to_path_buf(), source: e })?;
        let mut config = Self::parse(&content)?;
        config.root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        debug!(path = %path.display(), stacks = config.stacks.len(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| CstackError::InvalidConfig { reason: e.to_string() })?;
        if config.engine.is_empty() {
            return Err(CstackError::InvalidConfig {
                reason: "engine must name at least one argv element".to_string(),
            });
        }
        Ok(config)
    }

    /// Directory of the configuration file.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the stack registry from the configuration snapshot.
    ///
    /// Applies the default path rule and resolves relative paths against the
    /// configuration directory. Fails on duplicate stack names.
    pub fn registry(&self) -> Result<StackRegistry> {
        let definitions = self
            .stacks
            .iter()
            .map(|entry| {
                let path = match &entry.path {
                    Some(path) => expand_home(path),
                    None => PathBuf::from("services").join(&entry.name).join("compose.yml"),
                };
                let path =
                    if path.is_absolute() { path } else { self.root.join(path) };
                StackDefinition { name: entry.name.clone(), path, ignored: entry.ignored }
            })
            .collect();
        StackRegistry::from_definitions(definitions)
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
