//! Import configuration, stored as JSON

use crate::error::{Error, Result};
use crate::model::EntityKind;
use crate::record::DecodePolicy;
use crate::state::FieldMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Settings for one import session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// How malformed input is handled
    pub policy: DecodePolicy,
    /// Field maps replacing the defaults for the listed kinds
    pub field_maps: BTreeMap<EntityKind, FieldMap>,
}

impl ImportConfig {
    pub fn new(policy: DecodePolicy) -> Self {
        Self {
            policy,
            field_maps: BTreeMap::new(),
        }
    }

    /// Replace the field map used for one entity kind
    pub fn with_field_map(mut self, kind: EntityKind, map: FieldMap) -> Self {
        self.field_maps.insert(kind, map);
        self
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: ImportConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    /// Save the configuration as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Every mapping needs a non-empty attribute and column name
    pub fn validate(&self) -> Result<()> {
        for (kind, map) in &self.field_maps {
            for mapping in map.iter() {
                if mapping.attribute.trim().is_empty() || mapping.column.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "empty attribute or column name in {} field map",
                        kind.table_name()
                    )));
                }
            }
        }
        Ok(())
    }
}
