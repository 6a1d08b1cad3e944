//! Registries for pipeline configurations and section blueprints.
//!
//! Both are plain values owned by the caller and handed to a
//! [`Transmogrifier`](crate::Transmogrifier); nothing here is global.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, TransmogrifierError};
use crate::section::Blueprint;

/// Metadata about a registered pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Path of the INI file holding the configuration.
    pub configuration: PathBuf,
}

/// Pipeline configurations by id, plus package roots for
/// `package:relative/path.cfg` references.
#[derive(Debug, Default)]
pub struct ConfigurationRegistry {
    infos: HashMap<String, ConfigurationInfo>,
    ids: Vec<String>,
    packages: HashMap<String, PathBuf>,
}

impl ConfigurationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: &str,
        title: &str,
        description: &str,
        configuration: impl Into<PathBuf>,
    ) -> Result<()> {
        if self.infos.contains_key(id) {
            return Err(TransmogrifierError::DuplicateConfiguration(id.to_string()));
        }
        self.ids.push(id.to_string());
        self.infos.insert(
            id.to_string(),
            ConfigurationInfo {
                id: id.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                configuration: configuration.into(),
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&ConfigurationInfo> {
        self.infos
            .get(id)
            .ok_or_else(|| TransmogrifierError::UnknownConfiguration(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.infos.contains_key(id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Make `name:relative/path` references resolve below `root`.
    pub fn register_package(&mut self, name: &str, root: impl Into<PathBuf>) {
        self.packages.insert(name.to_string(), root.into());
    }

    /// Resolve a configuration id to the file that holds it.
    ///
    /// Registered ids win; other ids containing `:` are package references.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        if let Some(info) = self.infos.get(id) {
            return Ok(info.configuration.clone());
        }
        match id.trim().split_once(':') {
            Some((package, relative)) => {
                let root = self.packages.get(package).ok_or_else(|| {
                    TransmogrifierError::UnknownPackage {
                        package: package.to_string(),
                        reference: id.to_string(),
                    }
                })?;
                Ok(root.join(Path::new(relative)))
            }
            None => Ok(self.get(id)?.configuration.clone()),
        }
    }
}

/// Section blueprints by id.
#[derive(Default, Clone)]
pub struct BlueprintRegistry {
    blueprints: HashMap<String, Blueprint>,
}

impl BlueprintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard blueprint library.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::blueprints::register_defaults(&mut registry);
        registry
    }

    /// Register (or replace) the blueprint for `id`.
    pub fn register(&mut self, id: &str, blueprint: Blueprint) {
        self.blueprints.insert(id.to_string(), blueprint);
    }

    pub fn get(&self, id: &str) -> Option<&Blueprint> {
        self.blueprints.get(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.blueprints.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl fmt::Debug for BlueprintRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueprintRegistry")
            .field("blueprints", &self.ids())
            .finish()
    }
}
