//! Configuration for layout, history, persistence and storage.
//!
//! Load order: `.pathway/config.toml` → environment variables → defaults.

use crate::graph::Position;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level pathway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathwayConfig {
    pub layout: LayoutConfig,
    pub history: HistoryConfig,
    pub persistence: PersistenceConfig,
    pub storage: StorageConfig,
}

/// Placement and layered-layout constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Rendered width of a module card.
    pub node_width: f64,
    /// Horizontal gap between two ranks.
    pub rank_gap: f64,
    /// Vertical distance between two nodes of the same rank.
    pub row_spacing: f64,
    /// Fixed anchor of the Entry node.
    pub entry_position: Position,
    /// Distance from the Entry column to the first module column.
    pub module_column_offset: f64,
    /// Vertical gap used when appending a module below the lowest one.
    pub append_gap: f64,
    /// Offset applied on both axes to duplicated nodes.
    pub duplicate_offset: f64,
    /// Barycenter sweeps used for crossing reduction.
    pub crossing_passes: usize,
}

/// Undo/redo history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum snapshots kept. 0 keeps the whole session.
    pub max_depth: usize,
}

/// Debounced persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiescence period before a debounced write fires.
    pub debounce_ms: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Compress course documents with zstd before writing.
    /// Decompression on load is automatic (detected by magic bytes).
    pub compress: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 250.0,
            rank_gap: 100.0,
            row_spacing: 150.0,
            entry_position: Position::new(0.0, 0.0),
            module_column_offset: 350.0,
            append_gap: 150.0,
            duplicate_offset: 20.0,
            crossing_passes: 4,
        }
    }
}

impl LayoutConfig {
    /// Horizontal distance between the columns of two adjacent ranks.
    pub fn rank_spacing(&self) -> f64 {
        self.node_width + self.rank_gap
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { debounce_ms: 1500 }
    }
}

impl PersistenceConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.parse()
    {
        *target = n;
    }
}

impl PathwayConfig {
    /// Load config from `.pathway/config.toml` in the project root, with env var overrides.
    /// Falls back to defaults if no config file exists.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".pathway").join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };

        env_override("PATHWAY_DEBOUNCE_MS", &mut config.persistence.debounce_ms);
        env_override("PATHWAY_HISTORY_DEPTH", &mut config.history.max_depth);
        env_override("PATHWAY_LAYOUT_PASSES", &mut config.layout.crossing_passes);
        env_override("PATHWAY_COMPRESS", &mut config.storage.compress);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.persistence.debounce_ms == 0 {
            anyhow::bail!("persistence.debounce_ms must be greater than 0");
        }
        if self.history.max_depth == 1 {
            anyhow::bail!("history.max_depth must be 0 (unbounded) or at least 2");
        }
        let layout = &self.layout;
        if layout.module_column_offset <= 0.0 {
            anyhow::bail!(
                "layout.module_column_offset ({}) must be positive so modules stay right of the entry node",
                layout.module_column_offset
            );
        }
        if layout.node_width <= 0.0 || layout.rank_gap < 0.0 || layout.row_spacing <= 0.0 {
            anyhow::bail!(
                "layout spacing must be positive (node_width={}, rank_gap={}, row_spacing={})",
                layout.node_width,
                layout.rank_gap,
                layout.row_spacing,
            );
        }
        Ok(())
    }
}
