//! Auxiliary visual modes: terrain, extruded buildings and the label-free
//! minimal basemap.

use layers::expr;
use layers::{LayerKind, LayerRegistry, LayerSpec, MapRuntime, SourceDescriptor, TerrainSpec};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{BuildingsConfig, EngineConfig, TerrainConfig};

pub const TERRAIN_SOURCE: &str = "terrain-dem";
pub const BUILDINGS_SOURCE: &str = "buildings";
pub const BUILDINGS_LAYER: &str = "3d-buildings";

#[derive(Debug)]
pub struct VisualModes {
    terrain: TerrainConfig,
    buildings_config: BuildingsConfig,
    label_markers: Vec<String>,
    exaggeration: f64,
    buildings: bool,
    minimal: bool,
    style_url: String,
}

impl VisualModes {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            terrain: config.terrain.clone(),
            buildings_config: config.buildings.clone(),
            label_markers: config.label_layer_markers.clone(),
            exaggeration: 0.0,
            buildings: false,
            minimal: false,
            style_url: config.style_url.clone(),
        }
    }

    pub fn terrain_exaggeration(&self) -> f64 {
        self.exaggeration
    }

    pub fn buildings_enabled(&self) -> bool {
        self.buildings
    }

    pub fn is_minimal(&self) -> bool {
        self.minimal
    }

    pub fn style_url(&self) -> &str {
        &self.style_url
    }

    /// Records a new basemap; `false` when it is already current.
    pub fn set_style_url(&mut self, url: &str) -> bool {
        if self.style_url == url {
            return false;
        }
        self.style_url = url.to_string();
        true
    }

    /// `0` flattens the globe; the DEM source stays installed.
    pub fn set_terrain_exaggeration<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        exaggeration: f64,
    ) -> bool {
        if !exaggeration.is_finite() || exaggeration < 0.0 {
            warn!(exaggeration, "ignoring invalid terrain exaggeration");
            return false;
        }
        self.exaggeration = exaggeration;
        if exaggeration == 0.0 {
            return registry.set_terrain(rt, None);
        }
        registry.ensure_source(
            rt,
            TERRAIN_SOURCE,
            SourceDescriptor::RasterDem {
                url: self.terrain.source_url.clone(),
                tile_size: self.terrain.tile_size,
            },
        );
        registry.set_terrain(
            rt,
            Some(TerrainSpec {
                source: TERRAIN_SOURCE.to_string(),
                exaggeration,
            }),
        )
    }

    pub fn set_buildings<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        enabled: bool,
    ) -> bool {
        if self.buildings == enabled {
            return false;
        }
        self.buildings = enabled;
        info!(enabled, "extruded buildings");
        if enabled && registry.layer(BUILDINGS_LAYER).is_none() {
            let cfg = &self.buildings_config;
            registry.ensure_source(
                rt,
                BUILDINGS_SOURCE,
                SourceDescriptor::Vector {
                    url: cfg.source_url.clone(),
                },
            );
            let spec = LayerSpec::new(BUILDINGS_LAYER, LayerKind::FillExtrusion, BUILDINGS_SOURCE)
                .source_layer(cfg.source_layer.as_str())
                .filter(json!(["==", ["get", "extrude"], "true"]))
                .zoom_range(Some(cfg.min_zoom), None)
                .paint("fill-extrusion-color", cfg.color.as_str())
                .paint("fill-extrusion-height", json!(["get", "height"]))
                .paint("fill-extrusion-base", json!(["get", "min_height"]))
                .paint("fill-extrusion-opacity", 0.8);
            registry.ensure_layer(rt, spec);
        }
        registry.set_visibility(rt, BUILDINGS_LAYER, enabled)
    }

    pub fn set_minimal<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &LayerRegistry,
        minimal: bool,
    ) -> usize {
        if self.minimal == minimal {
            return 0;
        }
        self.minimal = minimal;
        info!(minimal, "minimal basemap");
        self.apply_minimal(rt, registry)
    }

    fn is_label_layer(&self, id: &str) -> bool {
        self.label_markers.iter().any(|m| id.contains(m.as_str()))
    }

    /// Pushes label visibility into the basemap layers. Basemap layers are not
    /// registry-owned, so this has to run again after every style load.
    pub fn apply_minimal<R: MapRuntime + ?Sized>(&self, rt: &mut R, registry: &LayerRegistry) -> usize {
        let visibility = Value::from(expr::visibility(!self.minimal));
        let mut touched = 0;
        for id in rt.layer_order() {
            if registry.layer(&id).is_some() || !self.is_label_layer(&id) {
                continue;
            }
            match rt.set_layout_property(&id, "visibility", &visibility) {
                Ok(()) => touched += 1,
                Err(err) => warn!(layer = %id, %err, "could not toggle basemap labels"),
            }
        }
        debug!(touched, minimal = self.minimal, "basemap labels updated");
        touched
    }
}

#[cfg(test)]
mod tests {
    use layers::{HeadlessRuntime, LayerRegistry, MapRuntime, TerrainSpec};

    use super::{BUILDINGS_LAYER, TERRAIN_SOURCE, VisualModes};
    use crate::config::EngineConfig;

    fn setup() -> (HeadlessRuntime, LayerRegistry, VisualModes) {
        (
            HeadlessRuntime::new(),
            LayerRegistry::new(),
            VisualModes::new(&EngineConfig::default()),
        )
    }

    #[test]
    fn terrain_toggles_with_exaggeration() {
        let (mut rt, mut reg, mut modes) = setup();
        assert!(modes.set_terrain_exaggeration(&mut rt, &mut reg, 1.5));
        assert_eq!(
            rt.terrain(),
            Some(&TerrainSpec {
                source: TERRAIN_SOURCE.to_string(),
                exaggeration: 1.5
            })
        );
        assert!(!modes.set_terrain_exaggeration(&mut rt, &mut reg, f64::NAN));
        assert!(modes.set_terrain_exaggeration(&mut rt, &mut reg, 0.0));
        assert_eq!(rt.terrain(), None);
        assert!(rt.has_source(TERRAIN_SOURCE));
    }

    #[test]
    fn buildings_are_created_once() {
        let (mut rt, mut reg, mut modes) = setup();
        assert!(!rt.has_layer(BUILDINGS_LAYER));
        modes.set_buildings(&mut rt, &mut reg, true);
        assert!(rt.layer(BUILDINGS_LAYER).unwrap().is_visible());
        modes.set_buildings(&mut rt, &mut reg, false);
        assert!(!rt.layer(BUILDINGS_LAYER).unwrap().is_visible());
        modes.set_buildings(&mut rt, &mut reg, true);
        assert_eq!(rt.count_calls("add_layer", BUILDINGS_LAYER), 1);
    }

    #[test]
    fn minimal_mode_hides_basemap_labels_only() {
        let (mut rt, reg, mut modes) = setup();
        assert_eq!(modes.set_minimal(&mut rt, &reg, true), 1);
        assert!(!rt.is_layer_visible("place-labels"));
        assert!(rt.is_layer_visible("water"));
        assert_eq!(modes.set_minimal(&mut rt, &reg, true), 0);
        modes.set_minimal(&mut rt, &reg, false);
        assert!(rt.is_layer_visible("place-labels"));
    }
}
