//! Logging, metrics, and completion record sinks.

pub mod export;
pub mod logging;
pub mod metrics;

pub use export::{
    CollectingObserver, CompletionObserver, CompletionRecord, JsonLinesObserver, TracingObserver,
};
pub use logging::init_logging;
pub use metrics::{Metrics, MetricsSnapshot};
