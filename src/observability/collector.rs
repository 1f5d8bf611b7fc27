use std::collections::BTreeMap;
use std::sync::Arc;
use super::ElementMetrics;
use crate::core::ElementId;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub id: ElementId,
    pub name: String,
    pub frames_processed: u64,
    pub errors_count: u64,
    pub splices: u64,
    pub avg_latency_us: u64,
}

/// Metrics of every element in a graph, kept across splices
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: BTreeMap<ElementId, Arc<ElementMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metrics: Arc<ElementMetrics>) {
        self.metrics.insert(metrics.id(), metrics);
    }

    pub fn get(&self, id: ElementId) -> Option<Arc<ElementMetrics>> {
        self.metrics.get(&id).cloned()
    }

    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        self.metrics
            .values()
            .map(|m| MetricsSnapshot {
                id: m.id(),
                name: m.name().to_string(),
                frames_processed: m.frames_processed(),
                errors_count: m.errors_count(),
                splices: m.splices(),
                avg_latency_us: m.avg_latency_us(),
            })
            .collect()
    }

    pub fn generate_report(&self) -> String {
        let snapshot = self.snapshot();

        if snapshot.is_empty() {
            return "No elements registered".to_string();
        }

        let mut report = String::from("=== Pipeline Metrics ===\n");

        for metrics in &snapshot {
            report.push_str(&format!(
                "\n[{}] {}\n  Frames: {}\n  Errors: {}\n  Splices: {}\n  Avg Latency: {}μs\n",
                metrics.id,
                metrics.name,
                metrics.frames_processed,
                metrics.errors_count,
                metrics.splices,
                metrics.avg_latency_us
            ));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_ordered_by_id() {
        let mut collector = MetricsCollector::new();
        collector.register(Arc::new(ElementMetrics::new(ElementId(2), "sink")));
        collector.register(Arc::new(ElementMetrics::new(ElementId(0), "src")));

        let first = collector.get(ElementId(0)).unwrap();
        first.record_frame_processed();
        first.record_frame_processed();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot[0].name, "src");
        assert_eq!(snapshot[0].frames_processed, 2);
        assert_eq!(snapshot[1].id, ElementId(2));
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(MetricsCollector::new().generate_report(), "No elements registered");
    }
}
