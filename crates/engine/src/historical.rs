//! Historical boundary layers on top of the year timeline.
//!
//! One GeoJSON source feeds a fill, an outline and two highlight layers.
//! The highlight layers are filtered by the selected territory's canonical
//! owner and match nothing while no territory is selected.

use foundation::{Feature, FeatureCollection, LngLat};
use layers::expr;
use layers::{GeoJsonData, LayerKind, LayerRegistry, LayerSpec, MapRuntime, Popup, SourceDescriptor};
use streaming::{
    FetchError, FetchJob, HistoricalTimeline, RequestToken, TimelineStep, derive_owner,
};
use tracing::{debug, info, warn};

use crate::config::HistoricalConfig;

pub const HISTORICAL_SOURCE: &str = "historical";
pub const HISTORICAL_FILL: &str = "historical-fill";
pub const HISTORICAL_LINE: &str = "historical-line";
pub const HIGHLIGHT_FILL: &str = "historical-selected-fill";
pub const HIGHLIGHT_LINE: &str = "historical-selected-line";

const LAYERS: [&str; 4] = [HISTORICAL_FILL, HISTORICAL_LINE, HIGHLIGHT_FILL, HIGHLIGHT_LINE];

#[derive(Debug)]
pub struct HistoricalLayers {
    config: HistoricalConfig,
    timeline: HistoricalTimeline,
    enabled: bool,
    selected_owner: Option<String>,
}

impl HistoricalLayers {
    pub fn new(config: HistoricalConfig, years: Vec<i32>) -> Self {
        let timeline = HistoricalTimeline::new(years, config.properties.clone());
        Self {
            config,
            timeline,
            enabled: false,
            selected_owner: None,
        }
    }

    pub fn timeline(&self) -> &HistoricalTimeline {
        &self.timeline
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn selected_owner(&self) -> Option<&str> {
        self.selected_owner.as_deref()
    }

    /// Year to show on (re-)entry: the last request, else the configured start.
    pub fn resume_year(&self) -> i32 {
        self.timeline
            .requested_year()
            .or(self.timeline.displayed_year())
            .unwrap_or(self.config.initial_year)
    }

    fn fill_color(&self) -> serde_json::Value {
        expr::coalesce_get(
            &self.config.properties.color_out,
            &self.config.fallback_color,
        )
    }

    fn install<R: MapRuntime + ?Sized>(&self, rt: &mut R, registry: &mut LayerRegistry) {
        registry.ensure_source(
            rt,
            HISTORICAL_SOURCE,
            SourceDescriptor::Geojson {
                data: GeoJsonData::empty(),
            },
        );
        let owner = self.config.properties.owner_out.as_str();
        let specs = [
            LayerSpec::new(HISTORICAL_FILL, LayerKind::Fill, HISTORICAL_SOURCE)
                .paint("fill-color", self.fill_color())
                .paint("fill-opacity", self.config.fill_opacity),
            LayerSpec::new(HISTORICAL_LINE, LayerKind::Line, HISTORICAL_SOURCE)
                .paint("line-color", "#4d4d4d")
                .paint("line-width", 0.6),
            LayerSpec::new(HIGHLIGHT_FILL, LayerKind::Fill, HISTORICAL_SOURCE)
                .paint("fill-color", "#ffd54f")
                .paint("fill-opacity", 0.45)
                .filter(expr::match_nothing(owner)),
            LayerSpec::new(HIGHLIGHT_LINE, LayerKind::Line, HISTORICAL_SOURCE)
                .paint("line-color", "#ff8f00")
                .paint("line-width", 2.0)
                .filter(expr::match_nothing(owner)),
        ];
        for spec in specs {
            registry.ensure_layer(rt, spec.visible(false));
        }
    }

    /// Shows or hides every historical layer. Disabling makes in-flight
    /// snapshot requests stale and drops the highlight.
    pub fn set_enabled<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        enabled: bool,
    ) -> bool {
        if self.enabled == enabled {
            return false;
        }
        info!(enabled, "historical mode");
        self.enabled = enabled;
        if enabled {
            self.install(rt, registry);
        } else {
            self.clear_selection(rt, registry);
            self.timeline.invalidate();
        }
        for id in LAYERS {
            registry.set_visibility(rt, id, enabled);
        }
        true
    }

    pub fn request_year<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        year: i32,
    ) -> Option<FetchJob> {
        match self.timeline.request(year) {
            TimelineStep::Apply { year, data } => {
                debug!(year, "showing cached snapshot");
                self.show(rt, registry, data);
                None
            }
            TimelineStep::Fetch(job) => Some(job),
            TimelineStep::Unavailable => {
                warn!(year, "no historical years configured");
                None
            }
            TimelineStep::KeepDisplayed | TimelineStep::Stale => None,
        }
    }

    pub fn resolve<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        token: RequestToken,
        year: i32,
        result: Result<FeatureCollection, FetchError>,
    ) -> bool {
        match self.timeline.resolve(token, year, result) {
            TimelineStep::Apply { year, data } => {
                debug!(year, features = data.len(), "applying historical snapshot");
                self.show(rt, registry, data);
                true
            }
            TimelineStep::KeepDisplayed => {
                debug!(year, "keeping displayed snapshot");
                false
            }
            _ => false,
        }
    }

    fn show<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        data: FeatureCollection,
    ) {
        registry.set_source_data(rt, HISTORICAL_SOURCE, GeoJsonData::Inline(data));
        registry.set_paint(rt, HISTORICAL_FILL, "fill-color", self.fill_color());
    }

    /// Highlights every territory sharing `feature`'s owner and opens a popup.
    pub fn select<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        feature: &Feature,
        at: LngLat,
    ) -> bool {
        let props = &self.config.properties;
        let owner = feature
            .str_property(&props.owner_out)
            .map(str::to_string)
            .or_else(|| derive_owner(feature, props));
        let Some(owner) = owner else {
            debug!("clicked territory has no owner");
            return false;
        };

        let filter = expr::in_literal(&props.owner_out, [owner.as_str()]);
        registry.set_filter(rt, HIGHLIGHT_FILL, Some(filter.clone()));
        registry.set_filter(rt, HIGHLIGHT_LINE, Some(filter));

        let title = feature
            .str_property(&props.name_key)
            .unwrap_or(owner.as_str())
            .to_string();
        let body = match self.timeline.displayed_year() {
            Some(year) => format!("Owner: {owner} ({year})"),
            None => format!("Owner: {owner}"),
        };
        rt.show_popup(&Popup {
            at,
            title,
            body: Some(body),
        });
        self.selected_owner = Some(owner);
        true
    }

    pub fn clear_selection<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
    ) -> bool {
        if self.selected_owner.take().is_none() {
            return false;
        }
        let nothing = expr::match_nothing(&self.config.properties.owner_out);
        registry.set_filter(rt, HIGHLIGHT_FILL, Some(nothing.clone()));
        registry.set_filter(rt, HIGHLIGHT_LINE, Some(nothing));
        rt.close_popup();
        true
    }
}
