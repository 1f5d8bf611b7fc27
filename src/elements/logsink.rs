use crate::core::{Caps, DataFrame, Element};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use streamctl_macros::StreamElement;

/// Logs a one-line summary of every channel of every frame
#[derive(StreamElement, Debug, Clone)]
#[element_meta(type_name = "logsink", description = "Logs frame statistics", sink = "ANY")]
pub struct LogSink {
    #[property(default = "\"Output\"")]
    label: String,
}

impl Default for LogSink {
    fn default() -> Self {
        Self {
            label: "Output".to_string(),
        }
    }
}

#[async_trait]
impl Element for LogSink {
    async fn on_create(&mut self, properties: &Value, _caps: &Caps) -> Result<()> {
        if let Some(label) = properties["label"].as_str() {
            self.label = label.to_string();
        }
        Ok(())
    }

    async fn process(&mut self, input: DataFrame) -> Result<Option<DataFrame>> {
        log::info!("[{}] Frame #{} @ {}μs via {}",
                   self.label,
                   input.sequence_id,
                   input.timestamp,
                   input.path().join(" -> "));

        for (channel, data) in &input.payload {
            let stats = if !data.is_empty() {
                let sum: f64 = data.iter().sum();
                let mean = sum / data.len() as f64;
                let rms = (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt();
                format!("len={}, mean={:.4}, rms={:.4}", data.len(), mean, rms)
            } else {
                "empty".to_string()
            };
            log::debug!("  {}: {}", channel, stats);
        }

        Ok(None)
    }
}
