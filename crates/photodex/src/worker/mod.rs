pub mod discovery;
pub mod pool;

pub use discovery::{DiscoveryOutcome, DiscoveryWalker};
pub use pool::WorkerPool;
