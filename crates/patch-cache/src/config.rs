//! Service configuration.
//!
//! Loaded from and saved to TOML. Every field has a default, so an empty file
//! (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use patch_diff::intraline::{
    DEFAULT_BLANK_LINE_PATTERN, DEFAULT_COALESCE_DISTANCE, DEFAULT_CONTROL_BLOCK_PATTERN,
};
use patch_diff::IntraLineHeuristics;
use patch_merge::MergeStrategyKind;
use serde::{Deserialize, Serialize};

use crate::CacheError;

const MIB: u64 = 1024 * 1024;

/// Top-level configuration of a [`crate::DiffOperations`] service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub diff: DiffSection,
    pub intraline: IntraLineSection,
    pub automerge: AutoMergeSection,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffSection {
    pub timeout_ms: u64,
    pub worker_threads: usize,
    /// Blobs larger than this many bytes are not diffed.
    pub large_object_threshold: u64,
    /// Similarity score for rename detection; 0 disables it.
    pub rename_score: u8,
}

impl Default for DiffSection {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            worker_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            large_object_threshold: MIB,
            rename_score: 60,
        }
    }
}

impl DiffSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rename_score(&self) -> Option<u8> {
        (self.rename_score > 0).then_some(self.rename_score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntraLineSection {
    pub timeout_ms: u64,
    pub coalesce_distance: usize,
    pub blank_line_pattern: String,
    pub control_block_pattern: String,
}

impl Default for IntraLineSection {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            coalesce_distance: DEFAULT_COALESCE_DISTANCE,
            blank_line_pattern: DEFAULT_BLANK_LINE_PATTERN.into(),
            control_block_pattern: DEFAULT_CONTROL_BLOCK_PATTERN.into(),
        }
    }
}

impl IntraLineSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Compile the heuristics. Invalid patterns are a configuration error.
    pub fn heuristics(&self) -> Result<IntraLineHeuristics, CacheError> {
        Ok(IntraLineHeuristics::new(
            self.coalesce_distance,
            &self.blank_line_pattern,
            &self.control_block_pattern,
        )?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMergeSection {
    /// Write synthesized auto-merges to the repository instead of keeping
    /// them in memory.
    pub save: bool,
    pub strategy: MergeStrategyKind,
}

impl Default for AutoMergeSection {
    fn default() -> Self {
        Self {
            save: true,
            strategy: MergeStrategyKind::Recursive,
        }
    }
}

/// Limits of one cache layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Total weight of in-memory entries, roughly in bytes.
    pub memory_limit: u64,
    /// Keep entries in the persistent store as well.
    pub persist: bool,
}

impl LayerConfig {
    pub fn new(memory_limit: u64) -> Self {
        Self {
            memory_limit,
            persist: false,
        }
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self::new(10 * MIB)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Location of the persistent store. Without it no layer persists.
    pub directory: Option<PathBuf>,
    pub tree_diff: LayerConfig,
    pub git_file_diff: LayerConfig,
    pub file_diff: LayerConfig,
    pub modified_files: LayerConfig,
    pub diff_summary: LayerConfig,
    pub intraline: LayerConfig,
    pub auto_merge: LayerConfig,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            directory: None,
            tree_diff: LayerConfig::default(),
            git_file_diff: LayerConfig::default(),
            file_diff: LayerConfig::default(),
            modified_files: LayerConfig::default(),
            diff_summary: LayerConfig::default(),
            intraline: LayerConfig::default(),
            auto_merge: LayerConfig::new(MIB),
        }
    }
}

impl DiffConfig {
    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CacheError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String, CacheError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
