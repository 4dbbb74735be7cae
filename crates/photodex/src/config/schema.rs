use serde::{Deserialize, Serialize};

use crate::dupes::NameClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Directories to index, recursively.
    pub scan_roots: Vec<String>,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    /// Glob patterns (against root-relative paths) to skip during discovery.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_discovery_batch_size")]
    pub discovery_batch_size: usize,
    #[serde(default = "default_hash_batch_size")]
    pub hash_batch_size: usize,
    /// Coalescing interval of the directory monitor, in milliseconds.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic", "heif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_worker_count() -> usize {
    // A small pool overlaps I/O latency without saturating the disk.
    num_cpus::get().min(4)
}

fn default_discovery_batch_size() -> usize {
    500
}

fn default_hash_batch_size() -> usize {
    50
}

fn default_monitor_interval_ms() -> u64 {
    500
}

/// Duplicate-group ordering policy.
///
/// The default ranking (clean names, then numbered copies, then anything
/// named "copy") mirrors long-standing behavior; it is data, not law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_prefer")]
    pub prefer: Vec<NameClass>,
}

fn default_prefer() -> Vec<NameClass> {
    vec![NameClass::Clean, NameClass::NumberedCopy, NameClass::CopyNamed]
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            prefer: default_prefer(),
        }
    }
}

impl Config {
    /// Returns extensions lowercased, for case-insensitive matching.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.image_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }
}
