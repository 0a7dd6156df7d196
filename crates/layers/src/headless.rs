//! In-memory [`MapRuntime`] used by tests and the probe binary.
//!
//! Mirrors the behaviour of a real vector-tile map where it matters to the
//! engine: duplicate ids and missing references are errors, `set_style`
//! wipes every custom object but keeps listeners, and layer order honours
//! `before` anchors. Successful mutations are recorded in a call log.

use std::collections::{BTreeMap, BTreeSet};

use foundation::{FeatureRef, LngLatBounds};
use runtime::{EventKind, EventTarget, ListenerId};
use serde_json::{Map, Value};

use crate::map_runtime::{
    CameraOptions, CameraState, DEFAULT_STYLE_URL, MapRuntime, Popup, RenderedFeature,
    RuntimeError, ScreenPoint,
};
use crate::spec::{GeoJsonData, ImageData, LayerSpec, SourceDescriptor, TerrainSpec};

const DEFAULT_BASEMAP_LAYERS: &[&str] = &["background", "water", "admin-boundaries", "place-labels"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: &'static str,
    pub target: String,
}

#[derive(Debug, Clone)]
enum StyleLayer {
    /// Basemap layers only accept layout changes.
    Basemap { id: String, layout: Map<String, Value> },
    Custom(LayerSpec),
}

impl StyleLayer {
    fn id(&self) -> &str {
        match self {
            StyleLayer::Basemap { id, .. } => id,
            StyleLayer::Custom(spec) => &spec.id,
        }
    }

    fn layout_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            StyleLayer::Basemap { layout, .. } => layout,
            StyleLayer::Custom(spec) => &mut spec.layout,
        }
    }
}

#[derive(Debug)]
pub struct HeadlessRuntime {
    style_url: String,
    style_loaded: bool,
    style_layers: BTreeMap<String, Vec<String>>,
    layers: Vec<StyleLayer>,
    sources: BTreeMap<String, SourceDescriptor>,
    images: BTreeMap<String, ImageData>,
    terrain: Option<TerrainSpec>,
    feature_state: BTreeMap<FeatureRef, Map<String, Value>>,
    listeners: BTreeMap<ListenerId, (EventKind, Option<String>)>,
    next_listener: u64,
    camera: CameraState,
    popup: Option<Popup>,
    rendered: Vec<RenderedFeature>,
    can_fit_bounds: bool,
    failing: BTreeSet<&'static str>,
    calls: Vec<RuntimeCall>,
}

impl Default for HeadlessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRuntime {
    /// A runtime with the default style already loaded.
    pub fn new() -> Self {
        let mut rt = Self {
            style_url: DEFAULT_STYLE_URL.to_string(),
            style_loaded: true,
            style_layers: BTreeMap::new(),
            layers: Vec::new(),
            sources: BTreeMap::new(),
            images: BTreeMap::new(),
            terrain: None,
            feature_state: BTreeMap::new(),
            listeners: BTreeMap::new(),
            next_listener: 0,
            camera: CameraState::default(),
            popup: None,
            rendered: Vec::new(),
            can_fit_bounds: true,
            failing: BTreeSet::new(),
            calls: Vec::new(),
        };
        rt.load_basemap();
        rt
    }

    /// Basemap layer ids a style URL brings along. Unknown URLs get the default set.
    pub fn set_style_layers(&mut self, style_url: &str, layers: &[&str]) {
        self.style_layers.insert(
            style_url.to_string(),
            layers.iter().map(|l| l.to_string()).collect(),
        );
    }

    fn load_basemap(&mut self) {
        let ids: Vec<String> = match self.style_layers.get(&self.style_url) {
            Some(ids) => ids.clone(),
            None => DEFAULT_BASEMAP_LAYERS.iter().map(|l| l.to_string()).collect(),
        };
        self.layers = ids
            .into_iter()
            .map(|id| StyleLayer::Basemap {
                id,
                layout: Map::new(),
            })
            .collect();
    }

    /// Completes a pending `set_style`. The host still has to deliver
    /// `MapEvent::StyleLoad` to the engine.
    pub fn mark_style_loaded(&mut self) {
        self.style_loaded = true;
    }

    pub fn style_url(&self) -> &str {
        &self.style_url
    }

    /// Makes every call of `op` fail until [`HeadlessRuntime::heal`].
    pub fn fail(&mut self, op: &'static str) {
        self.failing.insert(op);
    }

    pub fn heal(&mut self, op: &'static str) {
        self.failing.remove(op);
    }

    pub fn set_can_fit_bounds(&mut self, can_fit: bool) {
        self.can_fit_bounds = can_fit;
    }

    pub fn set_rendered_features(&mut self, features: Vec<RenderedFeature>) {
        self.rendered = features;
    }

    pub fn set_camera(&mut self, camera: CameraState) {
        self.camera = camera;
    }

    pub fn calls(&self) -> &[RuntimeCall] {
        &self.calls
    }

    pub fn count_calls(&self, op: &str, target: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.op == op && c.target == target)
            .count()
    }

    pub fn count_op(&self, op: &str) -> usize {
        self.calls.iter().filter(|c| c.op == op).count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find_map(|l| match l {
            StyleLayer::Custom(spec) if spec.id == id => Some(spec),
            _ => None,
        })
    }

    pub fn custom_layer_ids(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter_map(|l| match l {
                StyleLayer::Custom(spec) => Some(spec.id.clone()),
                StyleLayer::Basemap { .. } => None,
            })
            .collect()
    }

    /// Visibility of any style layer, basemap included.
    pub fn is_layer_visible(&self, id: &str) -> bool {
        self.layers
            .iter()
            .find(|l| l.id() == id)
            .is_some_and(|l| match l {
                StyleLayer::Basemap { layout, .. } => {
                    layout.get("visibility").and_then(Value::as_str) != Some("none")
                }
                StyleLayer::Custom(spec) => spec.is_visible(),
            })
    }

    pub fn source(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.get(id)
    }

    pub fn terrain(&self) -> Option<&TerrainSpec> {
        self.terrain.as_ref()
    }

    pub fn feature_state(&self, target: &FeatureRef) -> Option<&Map<String, Value>> {
        self.feature_state.get(target)
    }

    /// `true` when boolean flag `key` is set on `target`.
    pub fn has_state_flag(&self, target: &FeatureRef, key: &str) -> bool {
        self.feature_state(target)
            .and_then(|s| s.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners the host would invoke for `kind`, with their layer scope.
    pub fn listeners_for(&self, kind: EventKind) -> Vec<(ListenerId, Option<String>)> {
        self.listeners
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .map(|(id, (_, layer))| (*id, layer.clone()))
            .collect()
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    fn check(&self, op: &'static str) -> Result<(), RuntimeError> {
        if self.failing.contains(op) {
            return Err(RuntimeError::Rejected {
                op,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn record(&mut self, op: &'static str, target: &str) {
        self.calls.push(RuntimeCall {
            op,
            target: target.to_string(),
        });
    }

    fn custom_layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, RuntimeError> {
        self.layers
            .iter_mut()
            .find_map(|l| match l {
                StyleLayer::Custom(spec) if spec.id == id => Some(spec),
                _ => None,
            })
            .ok_or_else(|| RuntimeError::UnknownLayer(id.to_string()))
    }
}

impl EventTarget for HeadlessRuntime {
    fn bind(&mut self, event: EventKind, layer: Option<&str>) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.insert(id, (event, layer.map(str::to_string)));
        id
    }

    fn unbind(&mut self, listener: ListenerId) -> bool {
        self.listeners.remove(&listener).is_some()
    }
}

impl MapRuntime for HeadlessRuntime {
    fn add_source(&mut self, id: &str, source: &SourceDescriptor) -> Result<(), RuntimeError> {
        self.check("add_source")?;
        if self.sources.contains_key(id) {
            return Err(RuntimeError::SourceExists(id.to_string()));
        }
        self.sources.insert(id.to_string(), source.clone());
        self.record("add_source", id);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), RuntimeError> {
        self.check("remove_source")?;
        if !self.sources.contains_key(id) {
            return Err(RuntimeError::UnknownSource(id.to_string()));
        }
        let user = self.layers.iter().find_map(|l| match l {
            StyleLayer::Custom(spec) if spec.source == id => Some(spec.id.clone()),
            _ => None,
        });
        if let Some(layer) = user {
            return Err(RuntimeError::SourceInUse {
                source_id: id.to_string(),
                layer,
            });
        }
        self.sources.remove(id);
        self.feature_state.retain(|target, _| target.source != id);
        self.record("remove_source", id);
        Ok(())
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn set_source_data(&mut self, id: &str, data: &GeoJsonData) -> Result<(), RuntimeError> {
        self.check("set_source_data")?;
        match self.sources.get_mut(id) {
            Some(SourceDescriptor::Geojson { data: current }) => *current = data.clone(),
            Some(other) => {
                return Err(RuntimeError::Rejected {
                    op: "set_source_data",
                    reason: format!("`{id}` is a {} source", other.kind_name()),
                });
            }
            None => return Err(RuntimeError::UnknownSource(id.to_string())),
        }
        self.record("set_source_data", id);
        Ok(())
    }

    fn add_layer(&mut self, spec: &LayerSpec, before: Option<&str>) -> Result<(), RuntimeError> {
        self.check("add_layer")?;
        if self.has_layer(&spec.id) {
            return Err(RuntimeError::LayerExists(spec.id.clone()));
        }
        if !self.sources.contains_key(&spec.source) {
            return Err(RuntimeError::UnknownSource(spec.source.clone()));
        }
        let index = match before {
            Some(anchor) => self
                .layers
                .iter()
                .position(|l| l.id() == anchor)
                .ok_or_else(|| RuntimeError::Rejected {
                    op: "add_layer",
                    reason: format!("anchor `{anchor}` does not exist"),
                })?,
            None => self.layers.len(),
        };
        self.layers.insert(index, StyleLayer::Custom(spec.clone()));
        self.record("add_layer", &spec.id);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), RuntimeError> {
        self.check("remove_layer")?;
        let index = self
            .layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or_else(|| RuntimeError::UnknownLayer(id.to_string()))?;
        self.layers.remove(index);
        self.record("remove_layer", id);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id() == id)
    }

    fn layer_order(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.id().to_string()).collect()
    }

    fn set_paint_property(
        &mut self,
        layer: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), RuntimeError> {
        self.check("set_paint_property")?;
        self.custom_layer_mut(layer)?
            .paint
            .insert(name.to_string(), value.clone());
        self.record("set_paint_property", layer);
        Ok(())
    }

    fn set_layout_property(
        &mut self,
        layer: &str,
        name: &str,
        value: &Value,
    ) -> Result<(), RuntimeError> {
        self.check("set_layout_property")?;
        self.layers
            .iter_mut()
            .find(|l| l.id() == layer)
            .ok_or_else(|| RuntimeError::UnknownLayer(layer.to_string()))?
            .layout_mut()
            .insert(name.to_string(), value.clone());
        self.record("set_layout_property", layer);
        Ok(())
    }

    fn set_filter(&mut self, layer: &str, filter: Option<&Value>) -> Result<(), RuntimeError> {
        self.check("set_filter")?;
        self.custom_layer_mut(layer)?.filter = filter.cloned();
        self.record("set_filter", layer);
        Ok(())
    }

    fn add_image(&mut self, id: &str, image: &ImageData) -> Result<(), RuntimeError> {
        self.check("add_image")?;
        if self.images.contains_key(id) {
            return Err(RuntimeError::ImageExists(id.to_string()));
        }
        if !image.is_well_formed() {
            return Err(RuntimeError::Rejected {
                op: "add_image",
                reason: format!("`{id}` pixel buffer does not match {}x{}", image.width, image.height),
            });
        }
        self.images.insert(id.to_string(), image.clone());
        self.record("add_image", id);
        Ok(())
    }

    fn has_image(&self, id: &str) -> bool {
        self.images.contains_key(id)
    }

    fn set_terrain(&mut self, terrain: Option<&TerrainSpec>) -> Result<(), RuntimeError> {
        self.check("set_terrain")?;
        if let Some(t) = terrain
            && !self.sources.contains_key(&t.source)
        {
            return Err(RuntimeError::UnknownSource(t.source.clone()));
        }
        self.terrain = terrain.cloned();
        let target = terrain.map_or("none", |t| t.source.as_str()).to_string();
        self.record("set_terrain", &target);
        Ok(())
    }

    fn set_feature_state(
        &mut self,
        target: &FeatureRef,
        key: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        self.check("set_feature_state")?;
        if !self.sources.contains_key(&target.source) {
            return Err(RuntimeError::UnknownSource(target.source.clone()));
        }
        self.feature_state
            .entry(target.clone())
            .or_default()
            .insert(key.to_string(), value);
        self.record("set_feature_state", &target.id.to_string());
        Ok(())
    }

    fn remove_feature_state(&mut self, target: &FeatureRef, key: &str) -> Result<(), RuntimeError> {
        self.check("remove_feature_state")?;
        if !self.sources.contains_key(&target.source) {
            return Err(RuntimeError::UnknownSource(target.source.clone()));
        }
        if let Some(state) = self.feature_state.get_mut(target) {
            state.remove(key);
            if state.is_empty() {
                self.feature_state.remove(target);
            }
        }
        self.record("remove_feature_state", &target.id.to_string());
        Ok(())
    }

    fn query_rendered_features(&self, _point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        self.rendered
            .iter()
            .filter(|f| self.has_layer(&f.layer))
            .filter(|f| layers.is_empty() || layers.contains(&f.layer.as_str()))
            .cloned()
            .collect()
    }

    fn camera(&self) -> CameraState {
        self.camera
    }

    fn camera_for_bounds(&self, bounds: &LngLatBounds, padding: f64) -> Option<CameraState> {
        if !self.can_fit_bounds {
            return None;
        }
        let span = bounds.width().max(bounds.height());
        if !span.is_finite() {
            return None;
        }
        // Roughly one world width per 512 px tile at zoom 0.
        let zoom = ((360.0 / span.max(1e-6)).log2() - padding / 512.0).clamp(0.0, 16.0);
        Some(CameraState {
            center: bounds.center(),
            zoom,
            ..self.camera
        })
    }

    fn ease_to(&mut self, options: &CameraOptions) {
        if let Some(center) = options.center {
            self.camera.center = center;
        }
        if let Some(zoom) = options.zoom {
            self.camera.zoom = zoom;
        }
        self.record("ease_to", "camera");
    }

    fn jump_to(&mut self, options: &CameraOptions) {
        if let Some(center) = options.center {
            self.camera.center = center;
        }
        if let Some(zoom) = options.zoom {
            self.camera.zoom = zoom;
        }
        self.record("jump_to", "camera");
    }

    fn set_style(&mut self, style_url: &str) {
        self.style_url = style_url.to_string();
        self.style_loaded = false;
        self.sources.clear();
        self.images.clear();
        self.terrain = None;
        self.feature_state.clear();
        self.load_basemap();
        self.record("set_style", style_url);
    }

    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn show_popup(&mut self, popup: &Popup) {
        self.popup = Some(popup.clone());
        self.record("show_popup", &popup.title);
    }

    fn close_popup(&mut self) {
        if self.popup.take().is_some() {
            self.record("close_popup", "popup");
        }
    }
}

#[cfg(test)]
mod tests {
    use foundation::{FeatureId, FeatureRef, LngLatBounds};
    use runtime::{EventKind, EventTarget};
    use serde_json::json;

    use super::HeadlessRuntime;
    use crate::map_runtime::{MapRuntime, RuntimeError};
    use crate::spec::{LayerKind, LayerSpec, SourceDescriptor};

    fn geojson() -> SourceDescriptor {
        SourceDescriptor::Geojson {
            data: crate::spec::GeoJsonData::empty(),
        }
    }

    #[test]
    fn rejects_duplicates_and_dangling_references() {
        let mut rt = HeadlessRuntime::new();
        rt.add_source("s", &geojson()).unwrap();
        assert_eq!(
            rt.add_source("s", &geojson()),
            Err(RuntimeError::SourceExists("s".into()))
        );

        let spec = LayerSpec::new("l", LayerKind::Fill, "missing");
        assert_eq!(
            rt.add_layer(&spec, None),
            Err(RuntimeError::UnknownSource("missing".into()))
        );

        let spec = LayerSpec::new("l", LayerKind::Fill, "s");
        assert!(rt.add_layer(&spec, Some("nope")).is_err());
        rt.add_layer(&spec, Some("water")).unwrap();
        assert!(matches!(
            rt.remove_source("s"),
            Err(RuntimeError::SourceInUse { .. })
        ));
        assert_eq!(
            rt.set_paint_property("water", "fill-color", &json!("#000")),
            Err(RuntimeError::UnknownLayer("water".into()))
        );
        assert_eq!(
            rt.layer_order(),
            vec!["background", "l", "water", "admin-boundaries", "place-labels"]
        );

        rt.set_layout_property("place-labels", "visibility", &json!("none"))
            .unwrap();
        assert!(!rt.is_layer_visible("place-labels"));
        assert!(rt.is_layer_visible("water"));
    }

    #[test]
    fn set_style_wipes_custom_state_but_keeps_listeners() {
        let mut rt = HeadlessRuntime::new();
        rt.bind(EventKind::Click, Some("l"));
        rt.add_source("s", &geojson()).unwrap();
        rt.add_layer(&LayerSpec::new("l", LayerKind::Line, "s"), None)
            .unwrap();
        let target = FeatureRef::new("s", None, FeatureId::Number(1));
        rt.set_feature_state(&target, "hover", json!(true)).unwrap();
        assert!(rt.has_state_flag(&target, "hover"));

        rt.set_style("mapbox://styles/mapbox/dark-v11");
        assert!(!rt.is_style_loaded());
        assert!(!rt.has_source("s"));
        assert!(!rt.has_layer("l"));
        assert!(!rt.has_state_flag(&target, "hover"));
        assert_eq!(rt.listener_count(), 1);
        rt.mark_style_loaded();
        assert!(rt.is_style_loaded());
    }

    #[test]
    fn camera_for_bounds_can_be_refused() {
        let mut rt = HeadlessRuntime::new();
        let b = LngLatBounds::new(0.0, 0.0, 10.0, 5.0);
        let cam = rt.camera_for_bounds(&b, 0.0).unwrap();
        assert_eq!(cam.center, b.center());
        assert!(cam.zoom > 5.0 && cam.zoom < 5.2);

        rt.set_can_fit_bounds(false);
        assert!(rt.camera_for_bounds(&b, 40.0).is_none());
    }

    #[test]
    fn injected_failures_are_reported() {
        let mut rt = HeadlessRuntime::new();
        rt.fail("add_source");
        assert!(matches!(
            rt.add_source("s", &geojson()),
            Err(RuntimeError::Rejected { op: "add_source", .. })
        ));
        rt.heal("add_source");
        assert!(rt.add_source("s", &geojson()).is_ok());
        assert_eq!(rt.count_op("add_source"), 1);
    }
}
