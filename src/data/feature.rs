//! GeoJSON feature model shared by decoders, the tile cache and the map source

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Identifier distinguishing features for deduplication.
///
/// Integral numbers, `17` or `17.0`, are the same identifier. Other numbers
/// are kept by their text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(i64),
    String(String),
}

impl FeatureId {
    /// Read an identifier out of a JSON attribute value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(FeatureId::from_number(n)),
            Value::String(s) => Some(FeatureId::String(s.clone())),
            _ => None,
        }
    }

    fn from_number(n: &Number) -> Self {
        let integral = n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_INTEGER)
                .map(|f| f as i64)
        });
        match integral {
            Some(i) => FeatureId::Number(i),
            None => FeatureId::String(n.to_string()),
        }
    }
}

/// Largest integer an `f64` holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl<'de> Deserialize<'de> for FeatureId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FeatureId::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid feature id {value}")))
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeatureId::Number(n) => write!(f, "{n}"),
            FeatureId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for FeatureId {
    fn from(n: i64) -> Self {
        FeatureId::Number(n)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        FeatureId::String(s.to_string())
    }
}

/// A single GeoJSON feature
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    /// GeoJSON geometry object; `None` when the query asked for no geometry
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    /// Identifier used for deduplication.
    ///
    /// The GeoJSON `id` member wins; otherwise the value of `id_field` in the
    /// properties is used.
    pub fn identifier(&self, id_field: Option<&str>) -> Option<FeatureId> {
        if let Some(id) = &self.id {
            return Some(id.clone());
        }
        let field = id_field?;
        self.properties
            .as_ref()
            .and_then(|props| props.get(field))
            .and_then(FeatureId::from_value)
    }
}

/// A GeoJSON feature collection
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}
