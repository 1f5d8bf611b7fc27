pub mod metrics;
pub mod collector;

pub use metrics::ElementMetrics;
pub use collector::{MetricsCollector, MetricsSnapshot};
