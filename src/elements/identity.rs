use crate::core::Element;
use async_trait::async_trait;
use streamctl_macros::StreamElement;

/// Forwards every frame untouched
#[derive(StreamElement, Debug, Clone, Default)]
#[element_meta(type_name = "identity", description = "Pass-through", sink = "ANY", src = "ANY")]
pub struct Identity;

#[async_trait]
impl Element for Identity {}
