use std::collections::HashMap;
use serde::{Serialize, Deserialize};

/// Basic data unit passed between pipeline elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    /// Timestamp in microseconds since the source started
    pub timestamp: u64,

    /// Sequential frame number assigned by the source
    pub sequence_id: u64,

    /// Multi-channel samples keyed by channel name
    pub payload: HashMap<String, Vec<f64>>,

    /// Side-channel information (gain, sample_rate, etc)
    pub metadata: HashMap<String, String>,
}

impl DataFrame {
    pub fn new(timestamp: u64, sequence_id: u64) -> Self {
        Self {
            timestamp,
            sequence_id,
            payload: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_channel(mut self, name: impl Into<String>, samples: Vec<f64>) -> Self {
        self.payload.insert(name.into(), samples);
        self
    }

    /// Records that `element` touched this frame, in order of traversal
    pub fn mark_visited(&mut self, element: &str) {
        self.metadata
            .entry("path".to_string())
            .and_modify(|path| {
                path.push('>');
                path.push_str(element);
            })
            .or_insert_with(|| element.to_string());
    }

    /// Names of the elements that touched this frame
    pub fn path(&self) -> Vec<&str> {
        self.metadata
            .get("path")
            .map(|p| p.split('>').collect())
            .unwrap_or_default()
    }
}
