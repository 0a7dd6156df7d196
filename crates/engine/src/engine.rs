//! The map engine instance the host UI mounts.
//!
//! `MapEngine` owns the rendering runtime and every piece of engine state.
//! It never performs I/O: operations that need backend data queue a
//! [`FetchJob`], the host runs it and hands the [`FetchOutcome`] back to
//! [`MapEngine::deliver`]. Time only moves through [`MapEngine::advance`]
//! and [`MapEngine::on_animation_frame`].

use foundation::{FeatureRef, LngLat};
use layers::expr;
use layers::natural::LodMode;
use layers::{
    CameraOptions, ChoroplethManager, LayerKind, LayerRegistry, LayerSpec, LegendEntry, MapEvent,
    MapRuntime, Metric, NaturalManager, RenderedFeature, SourceDescriptor,
};
use runtime::{Disposer, EventKind, LifecycleTracker, ListenerId, RotationLoop, wrap_longitude};
use scene::{CameraPlan, FeatureStateOp, SelectionState, plan_camera, resolve_display_name};
use serde_json::Value;
use streaming::{
    FetchError, FetchJob, FetchKind, FetchOutbox, FetchOutcome, FetchPayload, NaturalFamily,
};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::handlers::{
    COUNTRIES_FILL, COUNTRIES_LINE, CountryClick, CountryClickCallback, HOVER_SLOT, Handler,
    LOD_SLOT, ROTATION_SLOT, TimerTask, country_code, first_on_layer,
};
use crate::historical::{HISTORICAL_FILL, HistoricalLayers};
use crate::modes::VisualModes;

const LISTENERS: [(EventKind, Option<&str>, Handler); 6] = [
    (EventKind::StyleLoad, None, Handler::StyleLoaded),
    (EventKind::MouseMove, Some(COUNTRIES_FILL), Handler::CountryHover),
    (EventKind::MouseLeave, Some(COUNTRIES_FILL), Handler::CountryLeave),
    (EventKind::Click, Some(COUNTRIES_FILL), Handler::CountryClick),
    (EventKind::Click, None, Handler::HistoricalClick),
    (EventKind::ZoomEnd, None, Handler::ZoomChanged),
];

pub struct MapEngine<R: MapRuntime> {
    config: EngineConfig,
    runtime: R,
    registry: LayerRegistry,
    lifecycle: LifecycleTracker<Handler, TimerTask>,
    listeners: Vec<Disposer>,
    outbox: FetchOutbox,
    choropleth: ChoroplethManager,
    natural: NaturalManager,
    historical: HistoricalLayers,
    modes: VisualModes,
    selection: SelectionState,
    pending_hover: Option<FeatureRef>,
    on_country_click: Option<CountryClickCallback>,
    year_hint: Option<i32>,
    auto_rotate: bool,
    now_ms: u64,
    mounted: bool,
    awaiting_style: bool,
    style_loads: u64,
}

impl<R: MapRuntime> MapEngine<R> {
    pub fn new(runtime: R, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let zoom = runtime.camera().zoom;
        Ok(Self {
            choropleth: ChoroplethManager::new(config.choropleth_config()),
            natural: NaturalManager::new(config.natural.clone(), zoom),
            historical: HistoricalLayers::new(
                config.historical.clone(),
                config.available_years.clone(),
            ),
            modes: VisualModes::new(&config),
            config,
            runtime,
            registry: LayerRegistry::new(),
            lifecycle: LifecycleTracker::new(),
            listeners: Vec::new(),
            outbox: FetchOutbox::new(),
            selection: SelectionState::new(),
            pending_hover: None,
            on_country_click: None,
            year_hint: None,
            auto_rotate: false,
            now_ms: 0,
            mounted: false,
            awaiting_style: false,
            style_loads: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn choropleth(&self) -> &ChoroplethManager {
        &self.choropleth
    }

    pub fn natural(&self) -> &NaturalManager {
        &self.natural
    }

    pub fn historical(&self) -> &HistoricalLayers {
        &self.historical
    }

    pub fn modes(&self) -> &VisualModes {
        &self.modes
    }

    pub fn lifecycle(&self) -> &LifecycleTracker<Handler, TimerTask> {
        &self.lifecycle
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// `true` between `set_basemap_style` and the matching style load.
    pub fn is_awaiting_style(&self) -> bool {
        self.awaiting_style
    }

    pub fn style_loads(&self) -> u64 {
        self.style_loads
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.auto_rotate
    }

    /// Mounts the engine. Builds the map right away when the style is
    /// already loaded, otherwise on the first style load.
    pub fn init(&mut self) {
        if self.mounted {
            debug!("init on mounted engine");
            return;
        }
        self.mounted = true;
        info!(style = self.modes.style_url(), "map engine mounted");
        if self.runtime.is_style_loaded() {
            self.rebuild();
        } else {
            self.awaiting_style = true;
            self.bind_listeners();
        }
    }

    /// Unmounts: unbinds every listener, cancels timers and removes every
    /// custom object. Responses arriving afterwards are ignored.
    pub fn dispose(&mut self) {
        if !self.mounted {
            return;
        }
        for disposer in std::mem::take(&mut self.listeners) {
            self.lifecycle.dispose(&mut self.runtime, disposer);
        }
        let report = self.lifecycle.teardown_all(&mut self.runtime);
        self.registry.clear(&mut self.runtime);
        self.runtime.close_popup();
        self.outbox.take();

        self.choropleth = ChoroplethManager::new(self.config.choropleth_config());
        self.natural = NaturalManager::new(self.config.natural.clone(), self.runtime.camera().zoom);
        self.historical = HistoricalLayers::new(
            self.config.historical.clone(),
            self.config.available_years.clone(),
        );
        self.modes = VisualModes::new(&self.config);
        self.selection = SelectionState::new();
        self.pending_hover = None;
        self.year_hint = None;
        self.auto_rotate = false;
        self.mounted = false;
        self.awaiting_style = false;
        info!(timers = report.timers, "map engine disposed");
    }

    fn bind_listeners(&mut self) {
        for (event, layer, handler) in LISTENERS {
            let disposer = self
                .lifecycle
                .register(&mut self.runtime, event, layer, handler);
            self.listeners.push(disposer);
        }
    }

    fn install_base(&mut self) {
        let cfg = &self.config.choropleth;
        let source_layer = cfg.source_layer.clone();
        self.registry.ensure_source(
            &mut self.runtime,
            &cfg.source,
            SourceDescriptor::Vector {
                url: self.config.countries_url.clone(),
            },
        );

        let opacity = expr::feature_state_case(
            "selected",
            Value::from(0.35),
            expr::feature_state_case("hover", Value::from(0.2), Value::from(0.0)),
        );
        let mut fill = LayerSpec::new(COUNTRIES_FILL, LayerKind::Fill, cfg.source.as_str())
            .paint("fill-color", "#627bc1")
            .paint("fill-opacity", opacity);
        let mut line = LayerSpec::new(COUNTRIES_LINE, LayerKind::Line, cfg.source.as_str())
            .paint("line-color", "#7a7a7a")
            .paint("line-width", 0.5);
        if let Some(source_layer) = source_layer {
            fill = fill.source_layer(source_layer.as_str());
            line = line.source_layer(source_layer);
        }
        self.registry.ensure_layer(&mut self.runtime, fill);
        self.registry.ensure_layer(&mut self.runtime, line);
    }

    /// Full teardown-and-replay after a style (re)load.
    fn rebuild(&mut self) {
        let pending_frame = self.lifecycle.take_frame();
        self.listeners.clear();
        let teardown = self.lifecycle.teardown_all(&mut self.runtime);
        let reinit = self.registry.reinitialize_all(&mut self.runtime);
        self.install_base();
        self.bind_listeners();

        let ops = self.selection.reapply();
        self.apply_state_ops(ops);
        if self.modes.is_minimal() {
            self.modes.apply_minimal(&mut self.runtime, &self.registry);
        }
        if self.auto_rotate {
            self.lifecycle
                .start_rotation(RotationLoop::new(self.config.rotation_deg_per_s));
        }
        if let Some(task) = pending_frame {
            self.lifecycle.request_frame(task);
        }
        let jobs = self.natural.refresh_all(&mut self.runtime, &mut self.registry);
        self.outbox.extend(jobs);

        self.awaiting_style = false;
        self.style_loads += 1;
        info!(
            loads = self.style_loads,
            listeners = teardown.listeners,
            layers = reinit.layers,
            sources = reinit.sources,
            failures = reinit.failures,
            "style rebuilt"
        );
    }

    /// Replaces the basemap. Custom state is rebuilt on the next style load.
    pub fn set_basemap_style(&mut self, style_url: &str) -> bool {
        if !self.modes.set_style_url(style_url) {
            debug!(style_url, "basemap already active");
            return false;
        }
        info!(style_url, "swapping basemap style");
        self.awaiting_style = true;
        self.runtime.set_style(style_url);
        true
    }

    pub fn set_country_click_callback(&mut self, callback: Option<CountryClickCallback>) {
        self.on_country_click = callback;
    }

    pub fn set_active_metric(&mut self, metric: Option<Metric>) {
        let job = self
            .choropleth
            .set_active(&mut self.runtime, &mut self.registry, metric);
        self.outbox.extend(job);
    }

    pub fn refresh_metric(&mut self, metric: Metric) {
        let job = self.choropleth.refresh(metric);
        self.outbox.push(job);
    }

    pub fn legend(&self) -> Option<&[LegendEntry]> {
        if self.choropleth.is_suppressed() {
            return None;
        }
        self.choropleth.legend()
    }

    pub fn set_historical_mode(&mut self, enabled: bool) {
        if !self
            .historical
            .set_enabled(&mut self.runtime, &mut self.registry, enabled)
        {
            return;
        }
        self.choropleth
            .set_suppressed(&mut self.runtime, &mut self.registry, enabled);
        self.registry
            .set_visibility(&mut self.runtime, COUNTRIES_FILL, !enabled);
        self.lifecycle.cancel_debounce(HOVER_SLOT);
        let ops = self.selection.clear_hover();
        self.apply_state_ops(ops);

        if enabled {
            let year = self
                .year_hint
                .take()
                .unwrap_or_else(|| self.historical.resume_year());
            let job = self
                .historical
                .request_year(&mut self.runtime, &mut self.registry, year);
            self.outbox.extend(job);
        }
    }

    /// Coalesced per animation frame: only the last year set before the
    /// next frame is requested.
    pub fn set_year(&mut self, year: i32) {
        if !self.historical.is_enabled() {
            self.year_hint = Some(year);
            return;
        }
        if let Some(TimerTask::SetYear(previous)) = self.lifecycle.request_frame(TimerTask::SetYear(year)) {
            debug!(previous, year, "year superseded within frame");
        }
    }

    pub fn set_natural_enabled(&mut self, family: NaturalFamily, enabled: bool) {
        let job = self
            .natural
            .set_enabled(&mut self.runtime, &mut self.registry, family, enabled);
        self.outbox.extend(job);
    }

    pub fn set_natural_lod(&mut self, family: NaturalFamily, mode: LodMode) {
        let job = self
            .natural
            .set_mode(&mut self.runtime, &mut self.registry, family, mode);
        self.outbox.extend(job);
    }

    pub fn set_terrain_exaggeration(&mut self, exaggeration: f64) -> bool {
        self.modes
            .set_terrain_exaggeration(&mut self.runtime, &mut self.registry, exaggeration)
    }

    pub fn set_buildings_enabled(&mut self, enabled: bool) -> bool {
        self.modes
            .set_buildings(&mut self.runtime, &mut self.registry, enabled)
    }

    pub fn set_minimal_mode(&mut self, minimal: bool) -> usize {
        self.modes
            .set_minimal(&mut self.runtime, &self.registry, minimal)
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) {
        self.auto_rotate = enabled;
        if enabled {
            self.lifecycle
                .start_rotation(RotationLoop::new(self.config.rotation_deg_per_s));
        } else {
            self.lifecycle.stop_rotation();
            self.lifecycle.cancel_debounce(ROTATION_SLOT);
        }
    }

    /// Jobs queued since the last call, oldest first.
    pub fn take_fetch_jobs(&mut self) -> Vec<FetchJob> {
        self.outbox.take()
    }

    pub fn pending_fetch_jobs(&self) -> &[FetchJob] {
        self.outbox.pending()
    }

    /// Feeds one finished fetch back in. Returns `true` when it changed what
    /// is displayed.
    pub fn deliver(&mut self, outcome: FetchOutcome) -> bool {
        if !self.mounted {
            debug!(path = %outcome.job.kind.path(), "dropping response for unmounted engine");
            return false;
        }
        let FetchOutcome { job, result } = outcome;
        let path = job.kind.path();
        match job.kind {
            FetchKind::History { year } => {
                let result = into_features(&path, result);
                self.historical
                    .resolve(&mut self.runtime, &mut self.registry, job.token, year, result)
            }
            FetchKind::Natural { family, tier, .. } => {
                let result = into_features(&path, result);
                self.natural.apply(
                    &mut self.runtime,
                    &mut self.registry,
                    family,
                    tier,
                    job.token,
                    result,
                )
            }
            FetchKind::Indicator { slug } => {
                let Some(metric) = Metric::from_slug(slug) else {
                    warn!(slug, "response for unknown metric");
                    return false;
                };
                match result {
                    Ok(FetchPayload::Indicators(table)) => self.choropleth.apply(
                        &mut self.runtime,
                        &mut self.registry,
                        metric,
                        job.token,
                        &table,
                    ),
                    Ok(FetchPayload::Features(_)) => {
                        let err = FetchError::Decode {
                            path,
                            message: "expected an indicator table".to_string(),
                        };
                        self.choropleth.fail(metric, job.token, &err);
                        false
                    }
                    Err(err) => {
                        self.choropleth.fail(metric, job.token, &err);
                        false
                    }
                }
            }
        }
    }

    /// Entry point for the host: `listener` is the id the runtime handed out
    /// when the engine bound it.
    pub fn on_event(&mut self, listener: ListenerId, event: MapEvent) {
        let Some(handler) = self.lifecycle.handler_for(listener).copied() else {
            debug!(listener = listener.0, "event for unknown listener");
            return;
        };
        match (handler, event) {
            (Handler::StyleLoaded, MapEvent::StyleLoad) => {
                if self.mounted {
                    self.rebuild();
                }
            }
            (Handler::CountryHover, MapEvent::MouseMove { features, .. }) => {
                self.on_country_hover(&features);
            }
            (Handler::CountryLeave, MapEvent::MouseLeave) => {
                self.lifecycle.cancel_debounce(HOVER_SLOT);
                self.pending_hover = None;
                let ops = self.selection.clear_hover();
                self.apply_state_ops(ops);
            }
            (Handler::CountryClick, MapEvent::Click { lng_lat, features, .. }) => {
                self.pause_rotation();
                if self.historical.is_enabled() {
                    return;
                }
                if let Some(hit) = first_on_layer(&features, COUNTRIES_FILL) {
                    self.select_country(hit, lng_lat);
                }
            }
            (Handler::HistoricalClick, MapEvent::Click { point, lng_lat, .. }) => {
                if !self.historical.is_enabled() {
                    return;
                }
                let hits = self
                    .runtime
                    .query_rendered_features(point, &[HISTORICAL_FILL]);
                match hits.first() {
                    Some(hit) => {
                        self.historical.select(
                            &mut self.runtime,
                            &mut self.registry,
                            &hit.feature,
                            lng_lat,
                        );
                    }
                    None => {
                        self.historical
                            .clear_selection(&mut self.runtime, &mut self.registry);
                    }
                }
            }
            (Handler::ZoomChanged, MapEvent::ZoomEnd { zoom }) => {
                self.pause_rotation();
                if self.natural.on_zoom(zoom) {
                    self.lifecycle.debounce(
                        LOD_SLOT,
                        self.now_ms,
                        self.config.lod_debounce_ms,
                        TimerTask::RefreshLod,
                    );
                }
            }
            (handler, event) => {
                debug!(?handler, kind = event.kind().as_str(), "event does not match handler");
            }
        }
    }

    /// Routes `event` to every bound listener the way the runtime would:
    /// layer-scoped pointer listeners fire only when the event hit that layer.
    pub fn dispatch(&mut self, event: MapEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<ListenerId> = self
            .lifecycle
            .bindings()
            .iter()
            .filter(|b| b.event == kind)
            .filter(|b| match (&b.layer, &event) {
                (None, _) => true,
                (Some(layer), MapEvent::MouseMove { features, .. })
                | (Some(layer), MapEvent::Click { features, .. }) => {
                    features.iter().any(|f| &f.layer == layer)
                }
                (Some(layer), _) => self.runtime.has_layer(layer),
            })
            .map(|b| b.listener)
            .collect();
        for listener in &targets {
            self.on_event(*listener, event.clone());
        }
        targets.len()
    }

    /// Moves the clock to `now_ms` and runs every timer that came due.
    pub fn advance(&mut self, now_ms: u64) -> usize {
        self.now_ms = self.now_ms.max(now_ms);
        let mut ran = 0;
        while let Some(task) = self.lifecycle.pop_due(self.now_ms) {
            self.run_task(task);
            ran += 1;
        }
        ran
    }

    pub fn on_animation_frame(&mut self, now_ms: u64) {
        self.advance(now_ms);
        if let Some(task) = self.lifecycle.take_frame() {
            self.run_task(task);
        }
        let delta = self
            .lifecycle
            .rotation_mut()
            .and_then(|rotation| rotation.step(now_ms));
        if let Some(delta) = delta {
            let camera = self.runtime.camera();
            let center = LngLat::new(wrap_longitude(camera.center.lng + delta), camera.center.lat);
            self.runtime.jump_to(&CameraOptions {
                center: Some(center),
                zoom: None,
                duration_ms: 0,
            });
        }
    }

    fn run_task(&mut self, task: TimerTask) {
        match task {
            TimerTask::ApplyHover(target) => {
                self.pending_hover = None;
                if self.historical.is_enabled() {
                    return;
                }
                let ops = self.selection.hover(target);
                self.apply_state_ops(ops);
            }
            TimerTask::RefreshLod => {
                let jobs = self.natural.refresh_all(&mut self.runtime, &mut self.registry);
                debug!(jobs = jobs.len(), zoom = self.natural.zoom(), "LOD refresh");
                self.outbox.extend(jobs);
            }
            TimerTask::SetYear(year) => {
                if !self.historical.is_enabled() {
                    self.year_hint = Some(year);
                    return;
                }
                let job = self
                    .historical
                    .request_year(&mut self.runtime, &mut self.registry, year);
                self.outbox.extend(job);
            }
            TimerTask::ResumeRotation => {
                if let Some(rotation) = self.lifecycle.rotation_mut() {
                    rotation.resume();
                }
            }
        }
    }

    fn on_country_hover(&mut self, features: &[RenderedFeature]) {
        if self.historical.is_enabled() {
            return;
        }
        let Some(target) = first_on_layer(features, COUNTRIES_FILL).and_then(RenderedFeature::state_ref)
        else {
            return;
        };
        let unchanged = if self.lifecycle.is_debounce_pending(HOVER_SLOT) {
            self.pending_hover.as_ref() == Some(&target)
        } else {
            self.selection.hovered() == Some(&target)
        };
        if unchanged {
            return;
        }
        self.pending_hover = Some(target.clone());
        self.lifecycle.debounce(
            HOVER_SLOT,
            self.now_ms,
            self.config.hover_debounce_ms,
            TimerTask::ApplyHover(target),
        );
    }

    fn pause_rotation(&mut self) {
        let Some(rotation) = self.lifecycle.rotation_mut() else {
            return;
        };
        rotation.pause();
        self.lifecycle.debounce(
            ROTATION_SLOT,
            self.now_ms,
            self.config.rotation_resume_ms,
            TimerTask::ResumeRotation,
        );
    }

    fn select_country(&mut self, hit: &RenderedFeature, click: LngLat) {
        let target = hit.state_ref();
        match &target {
            Some(target) if self.selection.is_selected(target) => {
                let ops = self.selection.clear_selection();
                self.apply_state_ops(ops);
                return;
            }
            Some(target) => {
                let ops = self.selection.select(target.clone());
                self.apply_state_ops(ops);
            }
            None => debug!(layer = %hit.layer, "clicked country without an id, no feature-state"),
        }
        self.fly_to_feature(hit, click);

        let code = country_code(hit, &self.config.choropleth.code_property)
            .or_else(|| target.map(|t| t.id.to_string()));
        let Some(code) = code else {
            debug!("clicked country has neither a code nor an id");
            return;
        };
        let name = resolve_display_name(&hit.feature, &code);

        info!(%code, %name, "country selected");
        if let Some(callback) = self.on_country_click.as_mut() {
            callback(&CountryClick {
                code,
                name,
                lng_lat: click,
            });
        }
    }

    fn fly_to_feature(&mut self, hit: &RenderedFeature, click: LngLat) {
        let defaults = self.config.camera;
        let plan = plan_camera(hit.feature.geometry.as_ref(), click, &defaults);
        let (center, zoom) = match plan {
            CameraPlan::Fit {
                bounds,
                center,
                padding,
            } => match self.runtime.camera_for_bounds(&bounds, padding) {
                Some(camera) => (center, camera.zoom),
                None => {
                    debug!("runtime cannot fit bounds, centering on click");
                    (click, defaults.fallback_zoom)
                }
            },
            CameraPlan::Fallback { center, zoom } => (center, zoom),
        };
        self.runtime.ease_to(&CameraOptions {
            center: Some(center),
            zoom: Some(zoom),
            duration_ms: defaults.duration_ms,
        });
    }

    fn apply_state_ops(&mut self, ops: Vec<FeatureStateOp>) {
        for op in ops {
            let (target, key, result) = match op {
                FeatureStateOp::Set { target, key } => {
                    let result =
                        self.runtime
                            .set_feature_state(&target, key.as_str(), Value::Bool(true));
                    (target, key, result)
                }
                FeatureStateOp::Clear { target, key } => {
                    let result = self.runtime.remove_feature_state(&target, key.as_str());
                    (target, key, result)
                }
            };
            if let Err(err) = result {
                warn!(feature = %target.id, key = key.as_str(), %err, "feature-state update failed");
            }
        }
    }

    /// Current hover target, for hosts that render their own tooltip.
    pub fn hovered(&self) -> Option<&FeatureRef> {
        self.selection.hovered()
    }
}

fn into_features(
    path: &str,
    result: Result<FetchPayload, FetchError>,
) -> Result<foundation::FeatureCollection, FetchError> {
    match result? {
        FetchPayload::Features(data) => Ok(data),
        FetchPayload::Indicators(_) => Err(FetchError::Decode {
            path: path.to_string(),
            message: "expected a feature collection".to_string(),
        }),
    }
}
