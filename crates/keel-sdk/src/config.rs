//! Configuration of a persistence manager.
//!
//! Every section is optional; missing values take their defaults.
//!
//! ```toml
//! ids = "Type:'Transient(1000000)', Object:'File(data/object.ids)'"
//! dispatch = "isolating"
//!
//! [registry]
//! hash_density = 1.0
//! minimum_capacity = 4096
//!
//! [storer]
//! mode = "eager"
//!
//! [legacy]
//! unmapped_field_policy = "reject"
//! repersist = true
//! mapping = """
//! app.Hound       -> app.Dog
//! app.Dog#nick    -> name
//! """
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use keel_handler::{LegacyConfig, RefactoringMapping};
use keel_ids::IdStrategyPair;
use keel_registry::RegistryConfig;
use keel_storer::{DispatchMode, StorerConfig};
use serde::{Deserialize, Serialize};

use crate::error::{KeelError, KeelResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Type id and object id strategies in their text form.
    pub ids: IdStrategyPair,
    pub registry: RegistryConfig,
    pub storer: StorerConfig,
    pub legacy: LegacySection,
    pub dispatch: DispatchMode,
}

/// Schema evolution settings plus the refactoring mapping, inline or in a
/// separate file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacySection {
    #[serde(flatten)]
    pub config: LegacyConfig,
    pub mapping: Option<String>,
    pub mapping_file: Option<PathBuf>,
}

impl PersistenceConfig {
    pub fn from_toml_str(text: &str) -> KeelResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a config file. A relative `legacy.mapping_file` is taken
    /// relative to the config file's directory.
    pub fn load(path: &Path) -> KeelResult<Self> {
        let text = read(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(file), Some(dir)) = (config.legacy.mapping_file.as_mut(), path.parent()) {
            if file.is_relative() {
                *file = dir.join(&*file);
            }
        }
        Ok(config)
    }

    /// The inline mapping followed by the mapping file's entries.
    pub fn refactoring_mapping(&self) -> KeelResult<RefactoringMapping> {
        let mut text = self.legacy.mapping.clone().unwrap_or_default();
        if let Some(file) = &self.legacy.mapping_file {
            text.push('\n');
            text.push_str(&read(file)?);
        }
        Ok(RefactoringMapping::parse(&text)?)
    }
}

fn read(path: &Path) -> KeelResult<String> {
    fs::read_to_string(path).map_err(|source| KeelError::Io {
        path: path.to_path_buf(),
        source,
    })
}
