use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geometry::Geometry;

/// Feature identifier as carried by GeoJSON and vector tiles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(u64),
    String(String),
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureId::Number(n) => write!(f, "{n}"),
            FeatureId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for FeatureId {
    fn from(n: u64) -> Self {
        FeatureId::Number(n)
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        FeatureId::String(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_tag")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

fn feature_tag() -> String {
    "Feature".to_string()
}

fn collection_tag() -> String {
    "FeatureCollection".to_string()
}

impl Feature {
    pub fn new(id: Option<FeatureId>, geometry: Option<Geometry>) -> Self {
        Self {
            kind: feature_tag(),
            id,
            geometry,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Returns a non-empty string property, trimmed.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_tag")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: collection_tag(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Addresses one feature for feature-state updates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub source: String,
    pub source_layer: Option<String>,
    pub id: FeatureId,
}

impl FeatureRef {
    pub fn new(source: impl Into<String>, source_layer: Option<&str>, id: FeatureId) -> Self {
        Self {
            source: source.into(),
            source_layer: source_layer.map(str::to_string),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureCollection, FeatureId};
    use crate::geometry::Geometry;

    #[test]
    fn parses_collection_with_mixed_ids() {
        let fc: FeatureCollection = serde_json::from_str(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "id": 7, "properties": {"NAME": " France "},
                     "geometry": {"type": "Point", "coordinates": [2.0, 46.0]}},
                    {"type": "Feature", "id": "gb", "properties": null, "geometry": null}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(fc.len(), 2);
        assert_eq!(fc.features[0].id, Some(FeatureId::Number(7)));
        assert_eq!(fc.features[0].str_property("NAME"), Some("France"));
        assert!(matches!(
            fc.features[0].geometry,
            Some(Geometry::Point { .. })
        ));
        assert_eq!(fc.features[1].id, Some(FeatureId::String("gb".into())));
        assert!(fc.features[1].geometry.is_none());
    }

    #[test]
    fn empty_string_property_reads_as_missing() {
        let fc: FeatureCollection = serde_json::from_str(
            r#"{"features":[{"properties":{"SUBJECTO":"  "}}]}"#,
        )
        .unwrap();
        assert_eq!(fc.kind, "FeatureCollection");
        assert_eq!(fc.features[0].str_property("SUBJECTO"), None);
    }
}
