pub mod cancel;
pub mod progress;
pub mod runner;

pub use cancel::CancelToken;
pub use progress::{NoopProgress, ProgressSink, ThrottledStatusSink};
pub use runner::IndexPipeline;
