use crate::core::{Caps, CapsValue, DataFrame, Element};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::f64::consts::PI;
use std::time::Duration;
use streamctl_macros::StreamElement;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Sine wave source producing one frame per interval
#[derive(StreamElement)]
#[element_meta(
    type_name = "testsrc",
    description = "Sine wave test source",
    src = "audio/x-raw, format=F64, channels=1"
)]
pub struct TestSource {
    #[property(default = "440.0", min = 1.0, max = 20000.0)]
    frequency: f64,

    #[property(default = "48000.0", min = 1.0, max = 384000.0)]
    sample_rate: f64,

    #[property(default = "1024", min = 1.0, max = 65536.0)]
    frame_size: u64,

    #[property(default = "10", min = 0.0, max = 60000.0)]
    interval_ms: u64,

    /// 0 means unlimited
    #[property(default = "0", min = 0.0)]
    num_buffers: u64,

    phase: f64,
    sequence: u64,
    ticker: Option<Interval>,
}

impl Default for TestSource {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            sample_rate: 48000.0,
            frame_size: 1024,
            interval_ms: 10,
            num_buffers: 0,
            phase: 0.0,
            sequence: 0,
            ticker: None,
        }
    }
}

impl TestSource {
    fn sample_rate_from_caps(caps: &Caps) -> Option<f64> {
        let Caps::Structures(structures) = caps else {
            return None;
        };
        structures.iter().find_map(|s| match s.fields.get("rate") {
            Some(CapsValue::Fixed(rate)) => rate.parse().ok(),
            _ => None,
        })
    }

    async fn wait_for_tick(&mut self) {
        if self.interval_ms == 0 {
            tokio::task::yield_now().await;
            return;
        }

        let period = Duration::from_millis(self.interval_ms);
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        ticker.tick().await;
    }
}

#[async_trait]
impl Element for TestSource {
    async fn on_create(&mut self, properties: &Value, caps: &Caps) -> Result<()> {
        if let Some(freq) = properties["frequency"].as_f64() {
            self.frequency = freq;
        }
        if let Some(sr) = properties["sample-rate"].as_f64() {
            self.sample_rate = sr;
        }
        if let Some(size) = properties["frame-size"].as_u64() {
            self.frame_size = size;
        }
        if let Some(ms) = properties["interval-ms"].as_u64() {
            self.interval_ms = ms;
        }
        if let Some(n) = properties["num-buffers"].as_u64() {
            self.num_buffers = n;
        }
        if let Some(rate) = Self::sample_rate_from_caps(caps) {
            self.sample_rate = rate;
        }
        Ok(())
    }

    async fn produce(&mut self) -> Result<Option<DataFrame>> {
        if self.num_buffers > 0 && self.sequence >= self.num_buffers {
            return Ok(None);
        }

        // Only the tick is awaited, so cancelling here loses no frame
        self.wait_for_tick().await;

        let frame_size = self.frame_size as usize;
        let phase_increment = 2.0 * PI * self.frequency / self.sample_rate;
        let samples: Vec<f64> = (0..frame_size)
            .map(|i| (self.phase + i as f64 * phase_increment).sin())
            .collect();
        self.phase = (self.phase + frame_size as f64 * phase_increment) % (2.0 * PI);

        let timestamp =
            (self.sequence as f64 * self.frame_size as f64 / self.sample_rate * 1e6) as u64;
        let frame = DataFrame::new(timestamp, self.sequence).with_channel("main_channel", samples);
        self.sequence += 1;

        Ok(Some(frame))
    }

    async fn on_release(&mut self) -> Result<()> {
        self.ticker = None;
        Ok(())
    }
}
