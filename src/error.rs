//! Error taxonomy of the pipeline control core.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::ElementId;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The description file could not be read.
    #[error("pipeline description not found at {}: {reason}", path.display())]
    NotFound { path: PathBuf, reason: String },

    /// A toggle addressed an id that is not part of the description.
    #[error("no element with id {0}")]
    ElementNotFound(ElementId),

    #[error("malformed pipeline description {}: {reason}", path.display())]
    MalformedDescription { path: PathBuf, reason: String },

    /// An element could not be instantiated, or two adjacent elements
    /// could not agree on caps.
    #[error("failed to build element {id} ({name}): {reason}")]
    BuildFailure {
        id: ElementId,
        name: String,
        reason: String,
    },

    /// No element would be active.
    #[error("pipeline has no active elements")]
    EmptyGraph,

    #[error("element {id} ({name}) is not optional")]
    NotOptional { id: ElementId, name: String },

    #[error("cannot {operation} while the graph is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// A stage failed while data was flowing.
    #[error("element {id} ({name}) failed while flowing: {reason}")]
    RuntimeFault {
        id: ElementId,
        name: String,
        reason: String,
    },
}

impl PipelineError {
    /// Errors the operator can recover from without restarting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound(_) | Self::NotOptional { .. } | Self::InvalidState { .. }
        )
    }

    /// Short taxonomy name, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::ElementNotFound(_) => "NotFound",
            Self::MalformedDescription { .. } => "MalformedDescription",
            Self::BuildFailure { .. } | Self::EmptyGraph => "BuildFailure",
            Self::NotOptional { .. } => "NotOptional",
            Self::InvalidState { .. } => "InvalidState",
            Self::RuntimeFault { .. } => "RuntimeFault",
        }
    }
}
