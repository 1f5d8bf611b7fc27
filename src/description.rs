//! Pipeline description loading.
//!
//! A description is a JSON document of the form
//!
//! ```json
//! {
//!   "pipeline": {
//!     "config": { "channel_capacity": 16 },
//!     "elements": [
//!       { "name": "src",  "type": "testsrc",  "caps": "audio/x-raw", "optional": false },
//!       { "name": "gain", "type": "volume",   "caps": "audio/x-raw", "optional": true,
//!         "enabled": false, "properties": { "gain": 0.5 } },
//!       { "name": "sink", "type": "fakesink", "caps": "ANY",         "optional": false }
//!     ]
//!   }
//! }
//! ```
//!
//! `config`, `enabled` and `properties` may be omitted. Entry order is
//! significant: it is the order data flows through the active elements.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::ElementId;
use crate::error::{PipelineError, Result};

const INLINE_ORIGIN: &str = "<inline>";

/// Static description of one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementSpec {
    pub id: ElementId,
    pub name: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub caps: String,
    pub optional: bool,
    /// Initial state of an optional element; always true otherwise
    pub enabled: bool,
    pub properties: Value,
}

/// Engine tuning read from `pipeline.config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bounded capacity of every link between two stages
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
        }
    }
}

/// Ordered element specifications for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescription {
    elements: Vec<ElementSpec>,
    config: PipelineConfig,
}

#[derive(Deserialize)]
struct RawDocument {
    pipeline: RawPipeline,
}

#[derive(Deserialize)]
struct RawPipeline {
    #[serde(default)]
    config: PipelineConfig,
    elements: Vec<RawElement>,
}

#[derive(Deserialize)]
struct RawElement {
    name: String,
    #[serde(rename = "type")]
    element_type: String,
    caps: String,
    optional: bool,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    properties: Value,
}

fn enabled_by_default() -> bool {
    true
}

/// Reads and parses the description at `path`
pub fn load(path: impl AsRef<Path>) -> Result<PipelineDescription> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| PipelineError::NotFound {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let description = parse_document(&content, path)?;
    log::debug!(
        "Loaded {} element(s) from {}",
        description.len(),
        path.display()
    );
    Ok(description)
}

/// Parses a description held in memory
pub fn parse(content: &str) -> Result<PipelineDescription> {
    parse_document(content, Path::new(INLINE_ORIGIN))
}

fn parse_document(content: &str, origin: &Path) -> Result<PipelineDescription> {
    let value: Value = serde_json::from_str(content).map_err(|e| malformed(origin, e))?;
    PipelineDescription::from_json_at(value, origin)
}

/// Ids are `u32`; a description with more entries cannot be addressed
fn element_id(index: usize, origin: &Path) -> Result<ElementId> {
    u32::try_from(index)
        .map(ElementId)
        .map_err(|_| malformed(origin, format!("element #{} exceeds the maximum element count", index)))
}

fn malformed(origin: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::MalformedDescription {
        path: origin.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl PipelineDescription {
    pub fn from_json(config: Value) -> Result<Self> {
        Self::from_json_at(config, Path::new(INLINE_ORIGIN))
    }

    fn from_json_at(config: Value, origin: &Path) -> Result<Self> {
        let raw: RawDocument = serde_json::from_value(config).map_err(|e| malformed(origin, e))?;

        let mut elements = Vec::with_capacity(raw.pipeline.elements.len());
        for (index, entry) in raw.pipeline.elements.into_iter().enumerate() {
            let properties = match entry.properties {
                Value::Null => Value::Object(Default::default()),
                props @ Value::Object(_) => props,
                other => {
                    return Err(malformed(
                        origin,
                        format!(
                            "element #{} ({}): properties must be an object, found {}",
                            index, entry.name, other
                        ),
                    ))
                }
            };

            elements.push(ElementSpec {
                id: element_id(index, origin)?,
                name: entry.name,
                element_type: entry.element_type,
                caps: entry.caps,
                optional: entry.optional,
                enabled: entry.enabled || !entry.optional,
                properties,
            });
        }

        let mut config = raw.pipeline.config;
        config.channel_capacity = config.channel_capacity.max(1);

        Ok(Self { elements, config })
    }

    pub fn new(elements: Vec<ElementSpec>, config: PipelineConfig) -> Self {
        Self { elements, config }
    }

    pub fn elements(&self) -> &[ElementSpec] {
        &self.elements
    }

    pub fn get(&self, id: ElementId) -> Option<&ElementSpec> {
        self.elements.get(id.index())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn optional_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.iter().filter(|e| e.optional).map(|e| e.id)
    }
}

impl IntoIterator for PipelineDescription {
    type Item = ElementSpec;
    type IntoIter = std::vec::IntoIter<ElementSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

/// Default location of the description shipped with the binary
pub fn default_path() -> PathBuf {
    PathBuf::from("resources/pipeline.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_follow_declaration_order() {
        let description = PipelineDescription::from_json(json!({
            "pipeline": {
                "elements": [
                    {"name": "a", "type": "testsrc", "caps": "ANY", "optional": false},
                    {"name": "b", "type": "volume", "caps": "ANY", "optional": true},
                    {"name": "c", "type": "fakesink", "caps": "ANY", "optional": false}
                ]
            }
        }))
        .unwrap();

        let ids: Vec<u32> = description.elements().iter().map(|e| e.id.0).collect();
        let names: Vec<&str> = description.elements().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(description.optional_ids().collect::<Vec<_>>(), vec![ElementId(1)]);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_element_id_overflow_is_malformed() {
        let origin = Path::new("big.json");
        assert_eq!(element_id(7, origin).unwrap(), ElementId(7));
        assert_eq!(element_id(u32::MAX as usize, origin).unwrap(), ElementId(u32::MAX));

        let err = element_id(u32::MAX as usize + 1, origin).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDescription { .. }));
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let description = parse(
            r#"{"pipeline": {"elements": [
                {"name": "a", "type": "testsrc", "caps": "", "optional": false, "enabled": false}
            ]}}"#,
        )
        .unwrap();

        let spec = &description.elements()[0];
        assert!(spec.enabled, "non-optional elements are always enabled");
        assert_eq!(spec.properties, json!({}));
        assert_eq!(description.config().channel_capacity, 100);
    }

    #[test]
    fn test_zero_channel_capacity_is_clamped() {
        let description = PipelineDescription::from_json(json!({
            "pipeline": {"config": {"channel_capacity": 0}, "elements": []}
        }))
        .unwrap();
        assert_eq!(description.config().channel_capacity, 1);
        assert!(description.is_empty());
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let err = PipelineDescription::from_json(json!({
            "pipeline": {"elements": [
                {"name": "a", "type": "testsrc", "caps": "ANY", "optional": "yes"}
            ]}
        }))
        .unwrap_err();
        assert_eq!(err.kind(), "MalformedDescription");
    }

    #[test]
    fn test_non_object_properties_are_malformed() {
        let err = PipelineDescription::from_json(json!({
            "pipeline": {"elements": [
                {"name": "a", "type": "testsrc", "caps": "ANY", "optional": false, "properties": [1]}
            ]}
        }))
        .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDescription { .. }));
    }
}
