pub mod caps;
pub mod dataframe;
pub mod element;

pub use caps::{Caps, CapsError, CapsStructure, CapsValue};
pub use dataframe::DataFrame;
pub use element::Element;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle of a declared element, assigned in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u32);

impl ElementId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ElementId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
