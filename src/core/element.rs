use super::{Caps, DataFrame};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Base trait for every stage that can be placed in a pipeline.
///
/// Sources implement `produce`, everything else implements `process`.
/// Which of the two the engine calls is decided by the element's
/// metadata: an element type without a sink template is a source.
#[async_trait]
pub trait Element: Send {
    /// Called once when the element is instantiated, with the `properties`
    /// object from the description and the parsed `caps` filter
    async fn on_create(&mut self, _properties: &Value, _caps: &Caps) -> Result<()> {
        Ok(())
    }

    /// Produce the next frame; `None` signals end-of-stream
    async fn produce(&mut self) -> Result<Option<DataFrame>> {
        anyhow::bail!("Element is not a source")
    }

    /// Transform one frame; `None` consumes it without forwarding
    async fn process(&mut self, input: DataFrame) -> Result<Option<DataFrame>> {
        Ok(Some(input))
    }

    /// Called when the element leaves the graph, right before the
    /// instance is dropped
    async fn on_release(&mut self) -> Result<()> {
        Ok(())
    }
}
