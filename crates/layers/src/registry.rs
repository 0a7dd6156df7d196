//! Remembered custom style state and idempotent runtime mutation.
//!
//! The registry is the desired state of every custom source, layer, image
//! and the terrain. Mutators update the remembered state first and then push
//! the difference into the runtime; pushing something that already matches
//! is a no-op. Runtime failures are logged and swallowed.
//!
//! After a style swap wipes the runtime, [`LayerRegistry::reinitialize_all`]
//! replays everything in dependency order: images, sources, terrain, layers.

use serde_json::Value;
use tracing::{debug, warn};

use crate::expr;
use crate::map_runtime::{MapRuntime, RuntimeError};
use crate::spec::{GeoJsonData, ImageData, LayerSpec, SourceDescriptor, TerrainSpec};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReinitReport {
    pub images: usize,
    pub sources: usize,
    pub terrain: bool,
    pub layers: usize,
    /// Anchors that were absent and therefore ignored.
    pub dropped_anchors: usize,
    pub failures: usize,
}

fn applied(op: &'static str, target: &str, result: Result<(), RuntimeError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(op, target, %err, "runtime call failed");
            false
        }
    }
}

#[derive(Debug, Default)]
pub struct LayerRegistry {
    sources: Vec<(String, SourceDescriptor)>,
    layers: Vec<LayerSpec>,
    images: Vec<(String, ImageData)>,
    terrain: Option<TerrainSpec>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn source(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|(sid, _)| sid == id).map(|(_, s)| s)
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.id.as_str())
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(id, _)| id.as_str())
    }

    pub fn image_ids(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|(id, _)| id.as_str())
    }

    pub fn terrain(&self) -> Option<&TerrainSpec> {
        self.terrain.as_ref()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.layer(id).is_some_and(LayerSpec::is_visible)
    }

    fn layer_mut(&mut self, id: &str) -> Option<&mut LayerSpec> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    /// Returns `true` when the runtime gained the source.
    pub fn ensure_source<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        id: &str,
        descriptor: SourceDescriptor,
    ) -> bool {
        match self.sources.iter().position(|(sid, _)| sid == id) {
            Some(idx) if self.sources[idx].1 == descriptor => {}
            Some(idx) => {
                let SourceDescriptor::Geojson { data } = &descriptor else {
                    debug!(source = id, "ignoring descriptor change on non-geojson source");
                    return false;
                };
                if !matches!(self.sources[idx].1, SourceDescriptor::Geojson { .. }) {
                    debug!(source = id, "ignoring source kind change");
                    return false;
                }
                let data = data.clone();
                self.sources[idx].1 = descriptor;
                if rt.has_source(id) {
                    applied("set_source_data", id, rt.set_source_data(id, &data));
                    return false;
                }
            }
            None => self.sources.push((id.to_string(), descriptor)),
        }

        if rt.has_source(id) {
            debug!(source = id, "source already present");
            return false;
        }
        let Some(descriptor) = self.source(id) else {
            return false;
        };
        applied("add_source", id, rt.add_source(id, descriptor))
    }

    /// Returns `true` when the runtime gained the layer. Re-adding an
    /// existing id is a no-op; use the `set_*` mutators to change it.
    pub fn ensure_layer<R: MapRuntime + ?Sized>(&mut self, rt: &mut R, spec: LayerSpec) -> bool {
        let id = spec.id.clone();
        if self.layer(&id).is_none() {
            self.layers.push(spec);
        }
        if rt.has_layer(&id) {
            debug!(layer = %id, "layer already present");
            return false;
        }
        let Some(spec) = self.layer(&id) else {
            return false;
        };
        let mut dropped = 0;
        push_layer(rt, spec, &mut dropped)
    }

    pub fn set_filter<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        id: &str,
        filter: Option<Value>,
    ) -> bool {
        let Some(spec) = self.layer_mut(id) else {
            debug!(layer = id, "set_filter on unknown layer");
            return false;
        };
        if spec.filter == filter {
            return false;
        }
        spec.filter = filter;
        let filter = spec.filter.clone();
        rt.has_layer(id) && applied("set_filter", id, rt.set_filter(id, filter.as_ref()))
    }

    pub fn set_paint<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        id: &str,
        name: &str,
        value: Value,
    ) -> bool {
        let Some(spec) = self.layer_mut(id) else {
            debug!(layer = id, property = name, "set_paint on unknown layer");
            return false;
        };
        if spec.paint.get(name) == Some(&value) {
            return false;
        }
        spec.paint.insert(name.to_string(), value.clone());
        rt.has_layer(id) && applied("set_paint_property", id, rt.set_paint_property(id, name, &value))
    }

    pub fn set_layout<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        id: &str,
        name: &str,
        value: Value,
    ) -> bool {
        let Some(spec) = self.layer_mut(id) else {
            debug!(layer = id, property = name, "set_layout on unknown layer");
            return false;
        };
        if spec.layout.get(name) == Some(&value) {
            return false;
        }
        spec.layout.insert(name.to_string(), value.clone());
        rt.has_layer(id)
            && applied("set_layout_property", id, rt.set_layout_property(id, name, &value))
    }

    pub fn set_visibility<R: MapRuntime + ?Sized>(&mut self, rt: &mut R, id: &str, visible: bool) -> bool {
        self.set_layout(rt, id, "visibility", Value::from(expr::visibility(visible)))
    }

    pub fn remove_layer<R: MapRuntime + ?Sized>(&mut self, rt: &mut R, id: &str) -> bool {
        let remembered = match self.layers.iter().position(|l| l.id == id) {
            Some(idx) => {
                self.layers.remove(idx);
                true
            }
            None => false,
        };
        if !rt.has_layer(id) {
            return remembered;
        }
        applied("remove_layer", id, rt.remove_layer(id)) || remembered
    }

    /// Removes the source after every custom layer that reads from it.
    pub fn remove_source<R: MapRuntime + ?Sized>(&mut self, rt: &mut R, id: &str) -> bool {
        let dependents: Vec<String> = self
            .layers
            .iter()
            .filter(|l| l.source == id)
            .map(|l| l.id.clone())
            .collect();
        for layer in &dependents {
            self.remove_layer(rt, layer);
        }

        let remembered = match self.sources.iter().position(|(sid, _)| sid == id) {
            Some(idx) => {
                self.sources.remove(idx);
                true
            }
            None => false,
        };
        if !rt.has_source(id) {
            return remembered;
        }
        applied("remove_source", id, rt.remove_source(id)) || remembered
    }

    /// Re-points a GeoJSON source at new data.
    pub fn set_source_data<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        id: &str,
        data: GeoJsonData,
    ) -> bool {
        let Some((_, descriptor)) = self.sources.iter_mut().find(|(sid, _)| sid == id) else {
            debug!(source = id, "set_source_data on unknown source");
            return false;
        };
        let SourceDescriptor::Geojson { data: current } = descriptor else {
            debug!(source = id, "set_source_data on non-geojson source");
            return false;
        };
        if *current == data {
            return false;
        }
        *current = data;
        let data = current.clone();
        rt.has_source(id) && applied("set_source_data", id, rt.set_source_data(id, &data))
    }

    pub fn ensure_image<R: MapRuntime + ?Sized>(&mut self, rt: &mut R, id: &str, image: ImageData) -> bool {
        if !self.images.iter().any(|(iid, _)| iid == id) {
            self.images.push((id.to_string(), image));
        }
        if rt.has_image(id) {
            return false;
        }
        match self.images.iter().find(|(iid, _)| iid == id) {
            Some((_, image)) => applied("add_image", id, rt.add_image(id, image)),
            None => false,
        }
    }

    pub fn set_terrain<R: MapRuntime + ?Sized>(&mut self, rt: &mut R, terrain: Option<TerrainSpec>) -> bool {
        if self.terrain == terrain {
            return false;
        }
        self.terrain = terrain;
        let target = self.terrain.as_ref().map_or("none", |t| t.source.as_str());
        applied("set_terrain", target, rt.set_terrain(self.terrain.as_ref()))
    }

    /// Removes everything this registry created and forgets it.
    pub fn clear<R: MapRuntime + ?Sized>(&mut self, rt: &mut R) {
        for spec in self.layers.drain(..).rev() {
            if rt.has_layer(&spec.id) {
                applied("remove_layer", &spec.id, rt.remove_layer(&spec.id));
            }
        }
        if self.terrain.take().is_some() {
            applied("set_terrain", "none", rt.set_terrain(None));
        }
        for (id, _) in self.sources.drain(..).rev() {
            if rt.has_source(&id) {
                applied("remove_source", &id, rt.remove_source(&id));
            }
        }
        self.images.clear();
    }

    /// Replays every remembered object into a freshly loaded style.
    pub fn reinitialize_all<R: MapRuntime + ?Sized>(&mut self, rt: &mut R) -> ReinitReport {
        let mut report = ReinitReport::default();

        for (id, image) in &self.images {
            if rt.has_image(id) {
                continue;
            }
            if applied("add_image", id, rt.add_image(id, image)) {
                report.images += 1;
            } else {
                report.failures += 1;
            }
        }

        for (id, descriptor) in &self.sources {
            if rt.has_source(id) {
                continue;
            }
            if applied("add_source", id, rt.add_source(id, descriptor)) {
                report.sources += 1;
            } else {
                report.failures += 1;
            }
        }

        if let Some(terrain) = &self.terrain {
            report.terrain = applied("set_terrain", &terrain.source, rt.set_terrain(Some(terrain)));
            if !report.terrain {
                report.failures += 1;
            }
        }

        // Layers anchored on a custom layer wait until that anchor exists.
        let mut pending: Vec<&LayerSpec> = self.layers.iter().collect();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            for spec in &pending {
                let waits_for_custom = spec.before.as_deref().is_some_and(|anchor| {
                    !rt.has_layer(anchor) && pending.iter().any(|p| p.id == anchor && p.id != spec.id)
                });
                if waits_for_custom {
                    deferred.push(*spec);
                } else {
                    replay_layer(rt, spec, &mut report);
                }
            }

            if deferred.len() == pending.len() {
                debug!(count = deferred.len(), "anchor cycle, appending in insertion order");
                for spec in &deferred {
                    replay_layer(rt, spec, &mut report);
                }
                break;
            }
            pending = deferred;
        }

        debug!(?report, "registry reinitialized");
        report
    }
}

fn replay_layer<R: MapRuntime + ?Sized>(rt: &mut R, spec: &LayerSpec, report: &mut ReinitReport) {
    if rt.has_layer(&spec.id) {
        return;
    }
    if push_layer(rt, spec, &mut report.dropped_anchors) {
        report.layers += 1;
    } else {
        report.failures += 1;
    }
}

/// Adds `spec`, dropping its anchor when the anchor layer is absent.
fn push_layer<R: MapRuntime + ?Sized>(rt: &mut R, spec: &LayerSpec, dropped_anchors: &mut usize) -> bool {
    if !rt.has_source(&spec.source) {
        warn!(layer = %spec.id, source = %spec.source, "layer source missing");
        return false;
    }
    let anchor = match spec.before.as_deref() {
        Some(anchor) if rt.has_layer(anchor) => Some(anchor),
        Some(anchor) => {
            debug!(layer = %spec.id, anchor, "anchor layer absent, appending");
            *dropped_anchors += 1;
            None
        }
        None => None,
    };
    applied("add_layer", &spec.id, rt.add_layer(spec, anchor))
}
