//! Stack registry and selection resolution.
//!
//! The registry is the ordered, validated set of stack definitions for one
//! invocation. Selection resolution turns a request (explicit names or
//! "all") into an ordered target list; every entry keeps registry insertion
//! order, which is the canonical report order.

use crate::error::{CstackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// A single managed compose stack. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    /// Unique name within the registry.
    pub name: String,
    /// Compose file path.
    pub path: PathBuf,
    /// Excluded from "all" selection when set.
    pub ignored: bool,
}

/// Ordered mapping of stack name to definition.
///
/// Insertion order is preserved from the configuration and never mutated
/// during dispatch.
#[derive(Debug, Clone, Default)]
pub struct StackRegistry {
    stacks: Vec<StackDefinition>,
    index: HashMap<String, usize>,
}

/// What subset of the registry a command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicitly named stacks. Explicit selection overrides `ignored`.
    Names(Vec<String>),
    /// Every stack, optionally including ignored ones.
    All { include_ignored: bool },
}

/// One resolved dispatch target.
#[derive(Debug, Clone)]
pub struct Target {
    /// The selected stack.
    pub stack: StackDefinition,
    /// Set when the compose file was missing at resolution time. The target
    /// is still carried through dispatch so it shows up in the report as a
    /// `ConfigInvalid` outcome without blocking the rest of the batch.
    pub config_error: Option<String>,
}

/// Ordered sequence of targets chosen for one run.
pub type TargetList = Vec<Target>;

impl StackRegistry {
    /// Build a registry from an ordered list of definitions.
    ///
    /// Duplicate names are a load-time error, not a runtime one.
    pub fn from_definitions(definitions: Vec<StackDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            if index.insert(def.name.clone(), i).is_some() {
                return Err(CstackError::DuplicateStack { name: def.name.clone() });
            }
        }
        Ok(Self { stacks: definitions, index })
    }

    /// Number of registered stacks.
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<&StackDefinition> {
        self.index.get(name).map(|&i| &self.stacks[i])
    }

    /// Iterate definitions in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &StackDefinition> {
        self.stacks.iter()
    }

    /// Resolve a selection into an ordered target list.
    ///
    /// Explicit-name resolution is atomic: one unknown name fails the whole
    /// request before any external invocation occurs. An empty result is not
    /// an error; the caller reports it as "nothing to do".
    pub fn resolve(&self, selection: &Selection) -> Result<TargetList> {
        let selected: Vec<&StackDefinition> = match selection {
            Selection::Names(names) => {
                for name in names {
                    if !self.index.contains_key(name) {
                        return Err(CstackError::UnknownStack { name: name.clone() });
                    }
                }
                // Registry order restricted to the request, duplicates dropped.
                let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
                self.stacks.iter().filter(|def| wanted.contains(def.name.as_str())).collect()
            }
            Selection::All { include_ignored } => self
                .stacks
                .iter()
                .filter(|def| *include_ignored || !def.ignored)
                .collect(),
        };

        let targets = selected
            .into_iter()
            .map(|def| {
                let config_error = if def.path.is_file() {
                    None
                } else {
                    Some(format!("compose file not found: {}", def.path.display()))
                };
                Target { stack: def.clone(), config_error }
            })
            .collect::<Vec<_>>();
        debug!(targets = targets.len(), "resolved selection");
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, ignored: bool) -> StackDefinition {
        StackDefinition {
            name: name.to_string(),
            path: PathBuf::from(format!("/nonexistent/{}/compose.yml", name)),
            ignored,
        }
    }

    fn registry() -> StackRegistry {
        StackRegistry::from_definitions(vec![
            def("web", false),
            def("db", false),
            def("backup", true),
            def("cache", false),
        ])
        .unwrap()
    }

    fn names(targets: &TargetList) -> Vec<&str> {
        targets.iter().map(|t| t.stack.name.as_str()).collect()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err =
            StackRegistry::from_definitions(vec![def("web", false), def("web", false)])
                .unwrap_err();
        assert!(matches!(err, CstackError::DuplicateStack { name } if name == "web"));
    }

    #[test]
    fn test_all_skips_ignored_in_order() {
        let targets = registry().resolve(&Selection::All { include_ignored: false }).unwrap();
        assert_eq!(names(&targets), vec!["web", "db", "cache"]);
    }

    #[test]
    fn test_all_include_ignored() {
        let targets = registry().resolve(&Selection::All { include_ignored: true }).unwrap();
        assert_eq!(names(&targets), vec!["web", "db", "backup", "cache"]);
    }

    #[test]
    fn test_explicit_names_keep_registry_order() {
        let selection = Selection::Names(vec!["cache".to_string(), "web".to_string()]);
        let targets = registry().resolve(&selection).unwrap();
        assert_eq!(names(&targets), vec!["web", "cache"]);
    }

    #[test]
    fn test_explicit_names_deduplicated() {
        let selection = Selection::Names(vec!["db".to_string(), "db".to_string()]);
        let targets = registry().resolve(&selection).unwrap();
        assert_eq!(names(&targets), vec!["db"]);
    }

    #[test]
    fn test_explicit_selection_overrides_ignored() {
        let selection = Selection::Names(vec!["backup".to_string()]);
        let targets = registry().resolve(&selection).unwrap();
        assert_eq!(names(&targets), vec!["backup"]);
    }

    #[test]
    fn test_unknown_name_fails_atomically() {
        let selection = Selection::Names(vec!["web".to_string(), "nope".to_string()]);
        let err = registry().resolve(&selection).unwrap_err();
        assert!(matches!(err, CstackError::UnknownStack { name } if name == "nope"));
    }

    #[test]
    fn test_empty_selection_is_not_an_error() {
        let registry = StackRegistry::from_definitions(vec![def("backup", true)]).unwrap();
        let targets = registry.resolve(&Selection::All { include_ignored: false }).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_missing_compose_file_marks_target() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("compose.yml");
        std::fs::write(&present, "services: {}\n").unwrap();

        let registry = StackRegistry::from_definitions(vec![
            StackDefinition { name: "ok".to_string(), path: present, ignored: false },
            def("gone", false),
        ])
        .unwrap();

        let targets = registry.resolve(&Selection::All { include_ignored: false }).unwrap();
        assert!(targets[0].config_error.is_none());
        assert!(targets[1].config_error.as_deref().unwrap().contains("compose file not found"));
    }
}
