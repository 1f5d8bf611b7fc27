//! Pipeline control core: loads a JSON pipeline description, runs it as a
//! chain of async stages and lets an operator splice optional elements in
//! and out while data flows.

extern crate self as streamctl;

pub mod app;
pub mod control;
pub mod core;
pub mod description;
pub mod elements;
pub mod engine;
pub mod error;
pub mod factory;
pub mod observability;
pub mod registry;

pub use error::{PipelineError, Result};
pub use streamctl_macros::StreamElement;
