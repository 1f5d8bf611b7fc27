use crate::core::{Caps, CapsError, Element};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON kind a property value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Number,
    Integer,
    String,
    Boolean,
    Any,
}

impl PropertyKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Any => true,
        }
    }
}

/// Schema for a configurable element property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    pub kind: PropertyKind,
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl PropertySchema {
    /// `default` is JSON text, e.g. `"1.0"` or `"\"label\""`
    pub fn new(
        name: &str,
        kind: PropertyKind,
        default: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        let default = serde_json::from_str(default)
            .unwrap_or_else(|_| Value::String(default.to_string()));
        Self {
            name: name.to_string(),
            kind,
            default,
            min,
            max,
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), String> {
        if !self.kind.accepts(value) {
            return Err(format!(
                "property '{}' expects {:?}, got {}",
                self.name, self.kind, value
            ));
        }

        if let Some(n) = value.as_f64() {
            if self.min.is_some_and(|min| n < min) || self.max.is_some_and(|max| n > max) {
                return Err(format!(
                    "property '{}' = {} is outside [{}, {}]",
                    self.name,
                    n,
                    self.min.map_or("-inf".to_string(), |v| v.to_string()),
                    self.max.map_or("inf".to_string(), |v| v.to_string()),
                ));
            }
        }

        Ok(())
    }
}

/// Constructor for a fresh, unconfigured element instance
pub type ElementConstructor = fn() -> Box<dyn Element>;

/// Complete metadata for an element type
#[derive(Clone)]
pub struct ElementMetadata {
    pub type_name: String,
    pub description: String,
    /// Caps accepted on the input side; `None` for sources
    pub sink_template: Option<String>,
    /// Caps produced on the output side; `None` for sinks
    pub src_template: Option<String>,
    pub properties: Vec<PropertySchema>,
    pub factory: ElementConstructor,
}

impl ElementMetadata {
    pub fn new(type_name: impl Into<String>, factory: ElementConstructor) -> Self {
        Self {
            type_name: type_name.into(),
            description: String::new(),
            sink_template: None,
            src_template: None,
            properties: Vec::new(),
            factory,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_sink(mut self, caps: impl Into<String>) -> Self {
        self.sink_template = Some(caps.into());
        self
    }

    pub fn with_src(mut self, caps: impl Into<String>) -> Self {
        self.src_template = Some(caps.into());
        self
    }

    pub fn add_property(mut self, property: PropertySchema) -> Self {
        self.properties.push(property);
        self
    }

    pub fn is_source(&self) -> bool {
        self.sink_template.is_none()
    }

    pub fn is_sink(&self) -> bool {
        self.src_template.is_none()
    }

    pub fn sink_caps(&self) -> Result<Option<Caps>, CapsError> {
        self.sink_template.as_deref().map(str::parse).transpose()
    }

    pub fn src_caps(&self) -> Result<Option<Caps>, CapsError> {
        self.src_template.as_deref().map(str::parse).transpose()
    }

    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Checks a `properties` object from a description against the schema
    pub fn validate_properties(&self, properties: &Value) -> Result<(), String> {
        let Some(map) = properties.as_object() else {
            return Err("properties must be an object".to_string());
        };

        for (name, value) in map {
            let schema = self
                .property(name)
                .ok_or_else(|| format!("{} has no property '{}'", self.type_name, name))?;
            schema.validate(value)?;
        }
        Ok(())
    }

    /// Create a new instance of this element type
    pub fn create_instance(&self) -> Box<dyn Element> {
        (self.factory)()
    }
}

/// Implemented by `#[derive(StreamElement)]`
pub trait ElementType {
    fn metadata() -> ElementMetadata;
}

pub type ElementMetadataFactory = fn() -> ElementMetadata;

/// Inventory submission wrapper
pub struct ElementRegistration(pub ElementMetadataFactory);

inventory::collect!(ElementRegistration);
