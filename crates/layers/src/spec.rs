use foundation::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerKind {
    Fill,
    Line,
    Symbol,
    FillExtrusion,
}

/// Declarative description of one custom style layer.
///
/// The registry remembers the latest version of every spec, including paint,
/// layout and filter changes made after creation, and replays it verbatim
/// after a style swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default)]
    pub paint: Map<String, Value>,
    #[serde(default)]
    pub layout: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    /// Insert below this layer when it exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, kind: LayerKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            source_layer: None,
            paint: Map::new(),
            layout: Map::new(),
            filter: None,
            before: None,
            min_zoom: None,
            max_zoom: None,
        }
    }

    pub fn source_layer(mut self, source_layer: impl Into<String>) -> Self {
        self.source_layer = Some(source_layer.into());
        self
    }

    pub fn paint(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.paint.insert(name.to_string(), value.into());
        self
    }

    pub fn layout(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.layout.insert(name.to_string(), value.into());
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn before(mut self, anchor: Option<&str>) -> Self {
        self.before = anchor.map(str::to_string);
        self
    }

    pub fn zoom_range(mut self, min_zoom: Option<f64>, max_zoom: Option<f64>) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn visible(self, visible: bool) -> Self {
        self.layout("visibility", crate::expr::visibility(visible))
    }

    /// Layers are visible unless their layout says `"none"`.
    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility").and_then(Value::as_str) != Some("none")
    }
}

/// Inline GeoJSON or a URL the runtime loads itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeoJsonData {
    Inline(FeatureCollection),
    Url(String),
}

impl GeoJsonData {
    pub fn empty() -> Self {
        GeoJsonData::Inline(FeatureCollection::default())
    }

    pub fn feature_count(&self) -> Option<usize> {
        match self {
            GeoJsonData::Inline(fc) => Some(fc.len()),
            GeoJsonData::Url(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceDescriptor {
    Vector { url: String },
    Geojson { data: GeoJsonData },
    RasterDem { url: String, tile_size: u32 },
}

impl SourceDescriptor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SourceDescriptor::Vector { .. } => "vector",
            SourceDescriptor::Geojson { .. } => "geojson",
            SourceDescriptor::RasterDem { .. } => "raster-dem",
        }
    }
}

/// Straight RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn is_well_formed(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize * 4
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSpec {
    pub source: String,
    pub exaggeration: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{GeoJsonData, LayerKind, LayerSpec, SourceDescriptor};

    #[test]
    fn builder_and_visibility() {
        let spec = LayerSpec::new("rivers", LayerKind::Line, "rivers-src")
            .paint("line-color", "#4a90d9")
            .visible(false);
        assert!(!spec.is_visible());
        assert_eq!(spec.layout["visibility"], json!("none"));
        assert!(spec.visible(true).is_visible());
    }

    #[test]
    fn descriptors_serialize_in_style_form() {
        let dem = SourceDescriptor::RasterDem {
            url: "mapbox://mapbox.terrain-rgb".into(),
            tile_size: 512,
        };
        assert_eq!(
            serde_json::to_value(&dem).unwrap(),
            json!({"type": "raster-dem", "url": "mapbox://mapbox.terrain-rgb", "tile_size": 512})
        );

        let gj = SourceDescriptor::Geojson {
            data: GeoJsonData::Url("/api/natural/peaks".into()),
        };
        assert_eq!(
            serde_json::to_value(&gj).unwrap(),
            json!({"type": "geojson", "data": "/api/natural/peaks"})
        );
        assert_eq!(
            serde_json::to_value(LayerKind::FillExtrusion).unwrap(),
            json!("fill-extrusion")
        );
    }
}
