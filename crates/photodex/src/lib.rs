pub mod categorizer;
pub mod config;
pub mod db;
pub mod dupes;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod metadata;
pub mod monitor;
pub mod pipeline;
pub mod status;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config, DuplicatesConfig};
pub use db::Database;
pub use dupes::{find_duplicates, DuplicateGroup, NameClass, OriginalityPolicy};
pub use error::{ConfigError, MetadataError, PhotodexError, Result, WorkerError};
pub use metadata::{ExtractedMetadata, ImageProbe, MetadataExtractor};
pub use monitor::{DirectoryMonitor, MonitorHandle};
pub use pipeline::{CancelToken, IndexPipeline, NoopProgress, ProgressSink, ThrottledStatusSink};
pub use status::{IndexPhase, PhaseProgress, RunState, RunSummary, StatusAggregator, StatusSnapshot};
