//! Module catalog: the read-only source of module records.

use crate::graph::ModuleData;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Lookup of catalog modules by reference.
pub trait ModuleCatalog {
    fn get(&self, module_ref: &str) -> Option<&ModuleData>;

    fn modules(&self) -> Vec<&ModuleData>;
}

/// Catalog backed by a fixed list, keyed by `module_ref`.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    modules: BTreeMap<String, ModuleData>,
}

impl StaticCatalog {
    pub fn new(modules: impl IntoIterator<Item = ModuleData>) -> Self {
        Self {
            modules: modules
                .into_iter()
                .map(|m| (m.module_ref.clone(), m))
                .collect(),
        }
    }

    /// Parse a JSON array of module records.
    pub fn from_json(json: &str) -> Result<Self> {
        let modules: Vec<ModuleData> =
            serde_json::from_str(json).context("failed to parse module catalog")?;
        Ok(Self::new(modules))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read module catalog {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleCatalog for StaticCatalog {
    fn get(&self, module_ref: &str) -> Option<&ModuleData> {
        self.modules.get(module_ref)
    }

    fn modules(&self) -> Vec<&ModuleData> {
        self.modules.values().collect()
    }
}
