//! Logging initialization for embedders.
//!
//! The library itself only emits through `log`/`tracing`; a host process
//! calls [`init`] once to wire both into a formatted subscriber.

use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber with an env-filter.
///
/// `RUST_LOG` takes precedence over `default_filter`. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init(default_filter: &str) {
    let _ = LogTracer::init();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("info");
        init("debug");
    }
}
