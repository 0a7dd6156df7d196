//! The vector-tile rendering runtime the engine drives.
//!
//! Implementations wrap a real map instance (through a host binding) or, in
//! tests, [`crate::headless::HeadlessRuntime`]. Calls are synchronous and may
//! fail; callers decide whether a failure matters.

use foundation::{Feature, FeatureRef, LngLat, LngLatBounds};
use runtime::{EventKind, EventTarget};
use serde_json::Value;
use thiserror::Error;

use crate::spec::{GeoJsonData, ImageData, LayerSpec, SourceDescriptor, TerrainSpec};

/// Basemap a fresh map starts on.
pub const DEFAULT_STYLE_URL: &str = "mapbox://styles/mapbox/light-v11";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("source `{0}` already exists")]
    SourceExists(String),
    #[error("source `{0}` does not exist")]
    UnknownSource(String),
    #[error("layer `{0}` already exists")]
    LayerExists(String),
    #[error("layer `{0}` does not exist")]
    UnknownLayer(String),
    #[error("image `{0}` already exists")]
    ImageExists(String),
    #[error("source `{source_id}` still used by layer `{layer}`")]
    SourceInUse { source_id: String, layer: String },
    #[error("runtime rejected {op}: {reason}")]
    Rejected { op: &'static str, reason: String },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraState {
    pub center: LngLat,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            center: LngLat::new(0.0, 20.0),
            zoom: 1.5,
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

/// Target of an `ease_to` / `jump_to`. Unset fields keep their value.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct CameraOptions {
    pub center: Option<LngLat>,
    pub zoom: Option<f64>,
    pub duration_ms: u64,
}

/// A feature as returned by a rendered-feature query or carried on an event.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub layer: String,
    pub source: String,
    pub source_layer: Option<String>,
    pub feature: Feature,
}

impl RenderedFeature {
    /// Feature-state address, when the feature carries an id.
    pub fn state_ref(&self) -> Option<FeatureRef> {
        let id = self.feature.id.clone()?;
        Some(FeatureRef::new(
            self.source.clone(),
            self.source_layer.as_deref(),
            id,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub at: LngLat,
    pub title: String,
    pub body: Option<String>,
}

/// Input delivered by the host to a listener registered on the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    StyleLoad,
    MouseMove {
        point: ScreenPoint,
        lng_lat: LngLat,
        features: Vec<RenderedFeature>,
    },
    MouseLeave,
    Click {
        point: ScreenPoint,
        lng_lat: LngLat,
        features: Vec<RenderedFeature>,
    },
    ZoomEnd {
        zoom: f64,
    },
}

impl MapEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::StyleLoad => EventKind::StyleLoad,
            MapEvent::MouseMove { .. } => EventKind::MouseMove,
            MapEvent::MouseLeave => EventKind::MouseLeave,
            MapEvent::Click { .. } => EventKind::Click,
            MapEvent::ZoomEnd { .. } => EventKind::ZoomEnd,
        }
    }
}

pub trait MapRuntime: EventTarget {
    fn add_source(&mut self, id: &str, source: &SourceDescriptor) -> Result<(), RuntimeError>;
    fn remove_source(&mut self, id: &str) -> Result<(), RuntimeError>;
    fn has_source(&self, id: &str) -> bool;
    fn set_source_data(&mut self, id: &str, data: &GeoJsonData) -> Result<(), RuntimeError>;

    /// Adds `spec` below `before`, or on top when `before` is `None`.
    fn add_layer(&mut self, spec: &LayerSpec, before: Option<&str>) -> Result<(), RuntimeError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), RuntimeError>;
    fn has_layer(&self, id: &str) -> bool;
    /// Every layer of the current style, bottom to top.
    fn layer_order(&self) -> Vec<String>;

    fn set_paint_property(&mut self, layer: &str, name: &str, value: &Value)
    -> Result<(), RuntimeError>;
    fn set_layout_property(
        &mut self,
        layer: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), RuntimeError>;
    fn set_filter(&mut self, layer: &str, filter: Option<&Value>) -> Result<(), RuntimeError>;

    fn add_image(&mut self, id: &str, image: &ImageData) -> Result<(), RuntimeError>;
    fn has_image(&self, id: &str) -> bool;
    fn set_terrain(&mut self, terrain: Option<&TerrainSpec>) -> Result<(), RuntimeError>;

    fn set_feature_state(
        &mut self,
        target: &FeatureRef,
        key: &str,
        value: Value,
    ) -> Result<(), RuntimeError>;
    fn remove_feature_state(&mut self, target: &FeatureRef, key: &str) -> Result<(), RuntimeError>;

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature>;

    fn camera(&self) -> CameraState;
    /// Camera that frames `bounds` with `padding` px, if the runtime can compute one.
    fn camera_for_bounds(&self, bounds: &LngLatBounds, padding: f64) -> Option<CameraState>;
    fn ease_to(&mut self, options: &CameraOptions);
    fn jump_to(&mut self, options: &CameraOptions);

    /// Replaces the whole style. Every custom source, layer, image and the
    /// terrain are discarded; `MapEvent::StyleLoad` follows once loaded.
    fn set_style(&mut self, style_url: &str);
    fn is_style_loaded(&self) -> bool;

    fn show_popup(&mut self, popup: &Popup);
    fn close_popup(&mut self);
}
