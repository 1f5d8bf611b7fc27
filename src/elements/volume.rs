use crate::core::{Caps, DataFrame, Element};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use streamctl_macros::StreamElement;

#[derive(StreamElement, Debug, Clone)]
#[element_meta(
    type_name = "volume",
    description = "Scales every channel by a constant gain",
    sink = "audio/x-raw",
    src = "audio/x-raw"
)]
pub struct Volume {
    #[property(default = "1.0", min = 0.0, max = 10.0)]
    gain: f64,
}

impl Default for Volume {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl Volume {
    pub fn gain(&self) -> f64 {
        self.gain
    }
}

#[async_trait]
impl Element for Volume {
    async fn on_create(&mut self, properties: &Value, _caps: &Caps) -> Result<()> {
        if let Some(g) = properties["gain"].as_f64() {
            self.gain = g;
        }
        Ok(())
    }

    async fn process(&mut self, mut input: DataFrame) -> Result<Option<DataFrame>> {
        for data in input.payload.values_mut() {
            for sample in data.iter_mut() {
                *sample *= self.gain;
            }
        }
        input
            .metadata
            .insert("gain".to_string(), self.gain.to_string());
        Ok(Some(input))
    }
}
