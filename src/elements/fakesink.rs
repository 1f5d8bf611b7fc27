use crate::core::{Caps, DataFrame, Element};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use streamctl_macros::StreamElement;

/// Discards frames, optionally verifying that none were lost or repeated
#[derive(StreamElement, Debug, Clone, Default)]
#[element_meta(type_name = "fakesink", description = "Discards every frame", sink = "ANY")]
pub struct FakeSink {
    /// Fail when a sequence id is skipped or repeated
    #[property(default = "false")]
    check_sequence: bool,

    /// Fail on the n-th frame, 0 disables
    #[property(default = "0", min = 0.0)]
    fail_after: u64,

    received: u64,
    last_sequence: Option<u64>,
}

impl FakeSink {
    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait]
impl Element for FakeSink {
    async fn on_create(&mut self, properties: &Value, _caps: &Caps) -> Result<()> {
        if let Some(check) = properties["check-sequence"].as_bool() {
            self.check_sequence = check;
        }
        if let Some(n) = properties["fail-after"].as_u64() {
            self.fail_after = n;
        }
        Ok(())
    }

    async fn process(&mut self, input: DataFrame) -> Result<Option<DataFrame>> {
        if self.check_sequence {
            let expected = self.last_sequence.map_or(input.sequence_id, |last| last + 1);
            if input.sequence_id != expected {
                bail!(
                    "sequence discontinuity: expected frame #{}, got #{}",
                    expected,
                    input.sequence_id
                );
            }
        }
        self.last_sequence = Some(input.sequence_id);
        self.received += 1;

        if self.fail_after > 0 && self.received >= self.fail_after {
            bail!("configured to fail after {} frame(s)", self.fail_after);
        }

        Ok(None)
    }
}
