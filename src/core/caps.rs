//! Capability descriptors.
//!
//! Caps use the familiar textual form
//! `audio/x-raw, rate=48000, channels={ 1, 2 }; audio/x-float`.
//! `ANY` (or an empty string) accepts everything, `EMPTY` accepts nothing.
//! A `(type)` prefix on a value, as in `rate=(int)48000`, is accepted and
//! ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapsError {
    #[error("caps structure is missing a media type in '{0}'")]
    MissingMediaType(String),

    #[error("caps field '{0}' is not of the form key=value")]
    InvalidField(String),

    #[error("unbalanced braces in '{0}'")]
    UnbalancedBraces(String),
}

/// Constraint on a single caps field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsValue {
    Fixed(String),
    /// Any of the listed values, first is preferred
    List(Vec<String>),
}

impl CapsValue {
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => (a == b).then(|| Self::Fixed(a.clone())),
            (Self::Fixed(v), Self::List(list)) | (Self::List(list), Self::Fixed(v)) => {
                list.contains(v).then(|| Self::Fixed(v.clone()))
            }
            (Self::List(a), Self::List(b)) => {
                let common: Vec<String> = a.iter().filter(|v| b.contains(v)).cloned().collect();
                match common.len() {
                    0 => None,
                    1 => common.into_iter().next().map(Self::Fixed),
                    _ => Some(Self::List(common)),
                }
            }
        }
    }
}

impl fmt::Display for CapsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, "{}", v),
            Self::List(values) => write!(f, "{{ {} }}", values.join(", ")),
        }
    }
}

/// One media type with its field constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsStructure {
    pub media_type: String,
    pub fields: BTreeMap<String, CapsValue>,
}

impl CapsStructure {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: CapsValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Fields present on only one side are carried over unchanged; shared
    /// fields must overlap.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.media_type != other.media_type {
            return None;
        }

        let mut fields = self.fields.clone();
        for (key, theirs) in &other.fields {
            let merged = match fields.get(key) {
                Some(ours) => ours.intersect(theirs)?,
                None => theirs.clone(),
            };
            fields.insert(key.clone(), merged);
        }

        Some(Self {
            media_type: self.media_type.clone(),
            fields,
        })
    }

    fn parse(text: &str) -> Result<Self, CapsError> {
        let mut parts = split_top_level(text, ',')?.into_iter();
        let media_type = parts.next().map(str::trim).unwrap_or_default();
        if media_type.is_empty() || media_type.contains('=') {
            return Err(CapsError::MissingMediaType(text.trim().to_string()));
        }

        let mut structure = Self::new(media_type);
        for field in parts {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| CapsError::InvalidField(field.trim().to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CapsError::InvalidField(field.trim().to_string()));
            }
            structure.fields.insert(key.to_string(), parse_value(value)?);
        }

        Ok(structure)
    }
}

impl fmt::Display for CapsStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        for (key, value) in &self.fields {
            write!(f, ", {}={}", key, value)?;
        }
        Ok(())
    }
}

/// A set of acceptable formats.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Caps {
    #[default]
    Any,
    /// Alternatives in order of preference; no alternatives means EMPTY
    Structures(Vec<CapsStructure>),
}

impl Caps {
    pub fn empty() -> Self {
        Self::Structures(Vec::new())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Structures(s) if s.is_empty())
    }

    pub fn intersect(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, other) => other.clone(),
            (this, Self::Any) => this.clone(),
            (Self::Structures(ours), Self::Structures(theirs)) => Self::Structures(
                ours.iter()
                    .flat_map(|a| theirs.iter().filter_map(move |b| a.intersect(b)))
                    .collect(),
            ),
        }
    }

    pub fn can_intersect(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }
}

impl FromStr for Caps {
    type Err = CapsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("ANY") {
            return Ok(Self::Any);
        }
        if text.eq_ignore_ascii_case("EMPTY") {
            return Ok(Self::empty());
        }

        split_top_level(text, ';')?
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(CapsStructure::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Structures)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "ANY"),
            Self::Structures(s) if s.is_empty() => write!(f, "EMPTY"),
            Self::Structures(structures) => {
                for (i, structure) in structures.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", structure)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_value(raw: &str) -> Result<CapsValue, CapsError> {
    let mut value = raw.trim();
    if value.starts_with('(') {
        if let Some(end) = value.find(')') {
            value = value[end + 1..].trim();
        }
    }

    if let Some(inner) = value.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| CapsError::UnbalancedBraces(raw.trim().to_string()))?;
        let values = inner
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        return Ok(CapsValue::List(values));
    }

    Ok(CapsValue::Fixed(value.to_string()))
}

/// Splits on `sep` outside of `{ }` lists.
fn split_top_level(text: &str, sep: char) -> Result<Vec<&str>, CapsError> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CapsError::UnbalancedBraces(text.to_string()))?;
            }
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(CapsError::UnbalancedBraces(text.to_string()));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(s: &str) -> Caps {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_any_and_empty() {
        assert!(caps("").is_any());
        assert!(caps("ANY").is_any());
        assert!(caps("EMPTY").is_empty());
    }

    #[test]
    fn test_parse_typed_values_and_lists() {
        let parsed = caps("audio/x-raw, rate=(int)48000, channels={ 1, 2 }");
        let Caps::Structures(structures) = parsed else {
            panic!("expected structures");
        };
        assert_eq!(structures.len(), 1);
        assert_eq!(structures[0].media_type, "audio/x-raw");
        assert_eq!(structures[0].fields["rate"], CapsValue::Fixed("48000".into()));
        assert_eq!(
            structures[0].fields["channels"],
            CapsValue::List(vec!["1".into(), "2".into()])
        );
    }

    #[test]
    fn test_parse_rejects_missing_media_type() {
        assert!("rate=48000".parse::<Caps>().is_err());
        assert!("audio/x-raw, rate".parse::<Caps>().is_err());
        assert!("audio/x-raw, channels={ 1, 2".parse::<Caps>().is_err());
    }

    #[test]
    fn test_intersect_merges_fields() {
        let a = caps("audio/x-raw, rate=48000");
        let b = caps("audio/x-raw, channels={ 1, 2 }");
        assert_eq!(a.intersect(&b), caps("audio/x-raw, rate=48000, channels={ 1, 2 }"));
    }

    #[test]
    fn test_intersect_conflicting_values_is_empty() {
        let a = caps("audio/x-raw, rate=48000");
        let b = caps("audio/x-raw, rate=44100");
        assert!(!a.can_intersect(&b));
        assert!(!caps("audio/x-raw").can_intersect(&caps("video/x-raw")));
    }

    #[test]
    fn test_intersect_list_narrows_to_fixed() {
        let a = caps("audio/x-raw, channels={ 1, 2 }");
        let b = caps("audio/x-raw, channels=2");
        assert_eq!(a.intersect(&b), caps("audio/x-raw, channels=2"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let original = caps("audio/x-raw, rate=48000; video/x-raw");
        assert_eq!(caps(&original.to_string()), original);
    }
}
