//! Rivers, mountain ranges and peaks with zoom-driven level of detail.
//!
//! Each family has one GeoJSON source and one layer, both created lazily the
//! first time the family is enabled. Switching tier re-points the source at
//! the tier's data; the layer is never recreated. Fetched data is kept per
//! `(family, tier)` for the session.

use std::collections::BTreeMap;

use foundation::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use streaming::{
    FetchError, FetchJob, FetchKind, LodTier, NaturalFamily, RequestCounter, RequestToken,
    SnapshotCache,
};
use tracing::{debug, info, warn};

use crate::map_runtime::MapRuntime;
use crate::registry::LayerRegistry;
use crate::spec::{GeoJsonData, ImageData, LayerKind, LayerSpec, SourceDescriptor};

pub const PEAK_ICON_ID: &str = "natural-peak-icon";
pub const PEAK_ICON_SIZE: u32 = 24;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LodMode {
    #[default]
    Auto,
    Low,
    Med,
    High,
}

impl LodMode {
    /// Tier pinned by this mode, `None` for auto.
    pub fn fixed_tier(self) -> Option<LodTier> {
        match self {
            LodMode::Auto => None,
            LodMode::Low => Some(LodTier::Low),
            LodMode::Med => Some(LodTier::Med),
            LodMode::High => Some(LodTier::High),
        }
    }
}

/// Zoom levels at which auto mode switches to a finer tier.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodBreakpoints {
    pub med: f64,
    pub high: f64,
}

impl Default for LodBreakpoints {
    fn default() -> Self {
        Self {
            med: 3.0,
            high: 5.5,
        }
    }
}

impl LodBreakpoints {
    pub fn tier_for_zoom(&self, zoom: f64) -> LodTier {
        if zoom < self.med {
            LodTier::Low
        } else if zoom < self.high {
            LodTier::Med
        } else {
            LodTier::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaturalConfig {
    pub breakpoints: LodBreakpoints,
    pub rivers_limit: u32,
    pub mountain_ranges_limit: u32,
    pub peaks_limit: u32,
    /// Limit multiplier per tier, low to high.
    pub tier_multipliers: [u32; 3],
}

impl Default for NaturalConfig {
    fn default() -> Self {
        Self {
            breakpoints: LodBreakpoints::default(),
            rivers_limit: 200,
            mountain_ranges_limit: 100,
            peaks_limit: 150,
            tier_multipliers: [1, 4, 12],
        }
    }
}

impl NaturalConfig {
    pub fn base_limit(&self, family: NaturalFamily) -> u32 {
        match family {
            NaturalFamily::Rivers => self.rivers_limit,
            NaturalFamily::MountainRanges => self.mountain_ranges_limit,
            NaturalFamily::Peaks => self.peaks_limit,
        }
    }

    pub fn limit(&self, family: NaturalFamily, tier: LodTier) -> u32 {
        self.base_limit(family)
            .saturating_mul(self.tier_multipliers[tier.index()])
    }
}

pub fn source_id(family: NaturalFamily) -> String {
    format!("natural-{family}")
}

pub fn layer_id(family: NaturalFamily) -> String {
    format!("natural-{family}")
}

fn layer_spec(family: NaturalFamily) -> LayerSpec {
    let source = source_id(family);
    let id = layer_id(family);
    match family {
        NaturalFamily::Rivers => LayerSpec::new(id, LayerKind::Line, source)
            .paint("line-color", "#4a90d9")
            .paint(
                "line-width",
                json!(["interpolate", ["linear"], ["zoom"], 1, 0.6, 6, 1.8]),
            )
            .layout("line-cap", "round"),
        NaturalFamily::MountainRanges => LayerSpec::new(id, LayerKind::Line, source)
            .paint("line-color", "#8b6f47")
            .paint("line-width", 1.2)
            .paint("line-dasharray", json!([2, 2])),
        NaturalFamily::Peaks => LayerSpec::new(id, LayerKind::Symbol, source)
            .layout("icon-image", PEAK_ICON_ID)
            .layout("icon-allow-overlap", false)
            .layout("text-field", json!(["get", "name"]))
            .layout("text-offset", json!([0, 1.1]))
            .layout("text-size", 11)
            .paint("text-color", "#5b4632"),
    }
}

/// Solid upward triangle on a transparent square, RGBA8.
pub fn peak_icon(size: u32) -> ImageData {
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    let center = (size as f64 - 1.0) / 2.0;
    for y in 0..size {
        let half_width = (y as f64 + 1.0) / size as f64 * (size as f64 / 2.0);
        for x in 0..size {
            let inside = (x as f64 - center).abs() <= half_width;
            if inside {
                pixels.extend_from_slice(&[0x6b, 0x4f, 0x3a, 0xff]);
            } else {
                pixels.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }
    ImageData {
        width: size,
        height: size,
        pixels,
    }
}

#[derive(Debug, Default)]
struct FamilyState {
    enabled: bool,
    mode: LodMode,
    applied: Option<LodTier>,
    requested: Option<LodTier>,
    tokens: RequestCounter,
}

#[derive(Debug)]
pub struct NaturalManager {
    config: NaturalConfig,
    zoom: f64,
    families: BTreeMap<NaturalFamily, FamilyState>,
    data: SnapshotCache<(NaturalFamily, LodTier), FeatureCollection>,
}

impl NaturalManager {
    pub fn new(config: NaturalConfig, zoom: f64) -> Self {
        Self {
            config,
            zoom,
            families: NaturalFamily::ALL
                .into_iter()
                .map(|f| (f, FamilyState::default()))
                .collect(),
            data: SnapshotCache::new(),
        }
    }

    pub fn config(&self) -> &NaturalConfig {
        &self.config
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    fn state(&self, family: NaturalFamily) -> &FamilyState {
        &self.families[&family]
    }

    fn state_mut(&mut self, family: NaturalFamily) -> &mut FamilyState {
        self.families.entry(family).or_default()
    }

    pub fn is_enabled(&self, family: NaturalFamily) -> bool {
        self.state(family).enabled
    }

    pub fn mode(&self, family: NaturalFamily) -> LodMode {
        self.state(family).mode
    }

    /// Tier currently shown by the family's source.
    pub fn applied_tier(&self, family: NaturalFamily) -> Option<LodTier> {
        self.state(family).applied
    }

    pub fn target_tier(&self, family: NaturalFamily) -> LodTier {
        self.mode(family)
            .fixed_tier()
            .unwrap_or_else(|| self.config.breakpoints.tier_for_zoom(self.zoom))
    }

    pub fn is_cached(&self, family: NaturalFamily, tier: LodTier) -> bool {
        self.data.contains(&(family, tier))
    }

    fn needs_refresh(&self, family: NaturalFamily) -> bool {
        let state = self.state(family);
        let target = self.target_tier(family);
        state.enabled && state.applied != Some(target) && state.requested != Some(target)
    }

    fn install<R: MapRuntime + ?Sized>(&self, rt: &mut R, registry: &mut LayerRegistry, family: NaturalFamily) {
        if family == NaturalFamily::Peaks && !registry.image_ids().any(|id| id == PEAK_ICON_ID) {
            registry.ensure_image(rt, PEAK_ICON_ID, peak_icon(PEAK_ICON_SIZE));
        }
        registry.ensure_source(
            rt,
            &source_id(family),
            SourceDescriptor::Geojson {
                data: GeoJsonData::empty(),
            },
        );
        registry.ensure_layer(rt, layer_spec(family));
    }

    pub fn set_enabled<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        family: NaturalFamily,
        enabled: bool,
    ) -> Option<FetchJob> {
        if self.state(family).enabled != enabled {
            info!(%family, enabled, "natural layer toggled");
        }
        self.state_mut(family).enabled = enabled;
        if enabled {
            self.install(rt, registry, family);
        }
        registry.set_visibility(rt, &layer_id(family), enabled);
        self.refresh(rt, registry, family)
    }

    pub fn set_mode<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        family: NaturalFamily,
        mode: LodMode,
    ) -> Option<FetchJob> {
        self.state_mut(family).mode = mode;
        self.refresh(rt, registry, family)
    }

    /// Records the zoom and reports whether any family now wants another tier.
    pub fn on_zoom(&mut self, zoom: f64) -> bool {
        self.zoom = zoom;
        for family in NaturalFamily::ALL {
            self.drop_obsolete_request(family);
        }
        NaturalFamily::ALL.into_iter().any(|f| self.needs_refresh(f))
    }

    /// Invalidates a request in flight for a tier other than the target when
    /// the target is already on screen.
    fn drop_obsolete_request(&mut self, family: NaturalFamily) {
        let target = self.target_tier(family);
        let state = self.state_mut(family);
        if state.applied != Some(target) {
            return;
        }
        if let Some(requested) = state.requested.filter(|r| *r != target) {
            state.tokens.next();
            state.requested = None;
            debug!(%family, %requested, %target, "dropped request for abandoned tier");
        }
    }

    /// Brings `family` to its target tier: from cache when possible,
    /// otherwise by returning a fetch.
    pub fn refresh<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        family: NaturalFamily,
    ) -> Option<FetchJob> {
        self.drop_obsolete_request(family);
        if !self.needs_refresh(family) {
            return None;
        }
        let tier = self.target_tier(family);
        if let Some(data) = self.data.get(&(family, tier)).cloned() {
            debug!(%family, %tier, "natural tier served from cache");
            let state = self.state_mut(family);
            // Any fetch still in flight is now obsolete.
            state.tokens.next();
            state.requested = None;
            state.applied = Some(tier);
            registry.set_source_data(rt, &source_id(family), GeoJsonData::Inline(data));
            return None;
        }

        let limit = self.config.limit(family, tier);
        let state = self.state_mut(family);
        let token = state.tokens.next();
        state.requested = Some(tier);
        debug!(%family, %tier, limit, "requesting natural tier");
        Some(FetchJob::new(
            token,
            FetchKind::Natural {
                family,
                tier,
                limit,
            },
        ))
    }

    pub fn refresh_all<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
    ) -> Vec<FetchJob> {
        NaturalFamily::ALL
            .into_iter()
            .filter_map(|f| self.refresh(rt, registry, f))
            .collect()
    }

    /// Handles a finished natural fetch. Successful data is cached even when
    /// stale; only the current request touches the source.
    pub fn apply<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        family: NaturalFamily,
        tier: LodTier,
        token: RequestToken,
        result: Result<FeatureCollection, FetchError>,
    ) -> bool {
        let current = self.state(family).tokens.is_current(token);
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                if current {
                    self.state_mut(family).requested = None;
                    warn!(%family, %tier, %err, "natural fetch failed; keeping current data");
                }
                return false;
            }
        };

        self.data.insert((family, tier), data.clone());
        if !current {
            debug!(%family, %tier, token = token.0, "cached stale natural response");
            return false;
        }
        let target = self.target_tier(family);
        let state = self.state_mut(family);
        state.requested = None;
        if tier != target {
            debug!(%family, %tier, %target, "cached natural tier no longer wanted");
            return false;
        }
        state.applied = Some(tier);
        registry.set_source_data(rt, &source_id(family), GeoJsonData::Inline(data));
        true
    }
}

#[cfg(test)]
mod tests {
    use foundation::{Feature, FeatureCollection, Geometry};
    use pretty_assertions::assert_eq;
    use streaming::{FetchError, FetchJob, FetchKind, LodTier, NaturalFamily};

    use super::{
        LodBreakpoints, LodMode, NaturalConfig, NaturalManager, PEAK_ICON_ID, peak_icon, source_id,
    };
    use crate::headless::HeadlessRuntime;
    use crate::map_runtime::MapRuntime;
    use crate::registry::LayerRegistry;

    fn river(name: &str) -> FeatureCollection {
        let line = Geometry::LineString {
            coordinates: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
        };
        FeatureCollection::new(vec![Feature::new(None, Some(line)).with_property("name", name)])
    }

    fn expect_natural(job: Option<FetchJob>) -> (FetchJob, LodTier, u32) {
        let job = job.expect("natural fetch");
        let FetchKind::Natural { tier, limit, .. } = job.kind else {
            panic!("unexpected job {:?}", job.kind);
        };
        (job, tier, limit)
    }

    #[test]
    fn auto_tier_follows_breakpoints() {
        let b = LodBreakpoints::default();
        assert_eq!(b.tier_for_zoom(0.0), LodTier::Low);
        assert_eq!(b.tier_for_zoom(2.99), LodTier::Low);
        assert_eq!(b.tier_for_zoom(3.0), LodTier::Med);
        assert_eq!(b.tier_for_zoom(5.49), LodTier::Med);
        assert_eq!(b.tier_for_zoom(5.5), LodTier::High);
    }

    #[test]
    fn limits_scale_per_tier() {
        let c = NaturalConfig::default();
        assert_eq!(c.limit(NaturalFamily::Rivers, LodTier::Low), 200);
        assert_eq!(c.limit(NaturalFamily::MountainRanges, LodTier::Med), 400);
        assert_eq!(c.limit(NaturalFamily::Peaks, LodTier::High), 1800);
    }

    #[test]
    fn peak_icon_is_a_well_formed_triangle() {
        let icon = peak_icon(24);
        assert!(icon.is_well_formed());
        let alpha = |x: u32, y: u32| icon.pixels[((y * 24 + x) * 4 + 3) as usize];
        assert_eq!(alpha(0, 0), 0);
        assert_eq!(alpha(12, 1), 0xff);
        assert_eq!(alpha(0, 23), 0xff);
        assert_eq!(alpha(23, 23), 0xff);
    }

    #[test]
    fn enabling_installs_lazily_and_fetches_once() {
        let mut rt = HeadlessRuntime::new();
        let mut reg = LayerRegistry::new();
        let mut mgr = NaturalManager::new(NaturalConfig::default(), 1.5);

        assert!(!rt.has_layer("natural-rivers"));
        let (job, tier, limit) =
            expect_natural(mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Rivers, true));
        assert_eq!((tier, limit), (LodTier::Low, 200));
        assert!(rt.layer("natural-rivers").unwrap().is_visible());
        assert!(mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Rivers, true).is_none());

        assert!(mgr.apply(&mut rt, &mut reg, NaturalFamily::Rivers, tier, job.token, Ok(river("Nile"))));
        assert_eq!(mgr.applied_tier(NaturalFamily::Rivers), Some(LodTier::Low));

        mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Rivers, false);
        assert!(!rt.layer("natural-rivers").unwrap().is_visible());
        assert!(mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Rivers, true).is_none());
        assert_eq!(rt.count_calls("add_layer", "natural-rivers"), 1);
    }

    #[test]
    fn peaks_register_the_icon_once() {
        let mut rt = HeadlessRuntime::new();
        let mut reg = LayerRegistry::new();
        let mut mgr = NaturalManager::new(NaturalConfig::default(), 1.5);
        mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Peaks, true);
        mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Peaks, false);
        mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Peaks, true);
        assert!(rt.has_image(PEAK_ICON_ID));
        assert_eq!(rt.count_calls("add_image", PEAK_ICON_ID), 1);
    }

    #[test]
    fn one_source_refresh_per_tier_crossing() {
        let mut rt = HeadlessRuntime::new();
        let mut reg = LayerRegistry::new();
        let mut mgr = NaturalManager::new(NaturalConfig::default(), 2.0);
        let family = NaturalFamily::MountainRanges;
        let source = source_id(family);

        let (job, tier, _) = expect_natural(mgr.set_enabled(&mut rt, &mut reg, family, true));
        mgr.apply(&mut rt, &mut reg, family, tier, job.token, Ok(river("Alps")));
        assert_eq!(rt.count_calls("set_source_data", &source), 1);

        assert!(!mgr.on_zoom(2.5));
        assert!(mgr.on_zoom(4.0));
        let (job, tier, limit) = expect_natural(mgr.refresh(&mut rt, &mut reg, family));
        assert_eq!((tier, limit), (LodTier::Med, 400));
        // A second zoom in the same band while the fetch is in flight asks for nothing.
        assert!(!mgr.on_zoom(4.5));
        assert!(mgr.refresh(&mut rt, &mut reg, family).is_none());
        mgr.apply(&mut rt, &mut reg, family, tier, job.token, Ok(river("Andes")));
        assert_eq!(rt.count_calls("set_source_data", &source), 2);

        assert!(mgr.on_zoom(7.0));
        let (job, tier, _) = expect_natural(mgr.refresh(&mut rt, &mut reg, family));
        assert_eq!(tier, LodTier::High);
        mgr.apply(&mut rt, &mut reg, family, tier, job.token, Ok(river("Himalaya")));
        assert_eq!(rt.count_calls("set_source_data", &source), 3);
        assert_eq!(rt.count_calls("add_layer", &source), 1);

        // Back down to a cached tier: no fetch, one more source refresh.
        assert!(mgr.on_zoom(2.0));
        assert!(mgr.refresh(&mut rt, &mut reg, family).is_none());
        assert_eq!(rt.count_calls("set_source_data", &source), 4);
        assert_eq!(mgr.applied_tier(family), Some(LodTier::Low));
    }

    #[test]
    fn fixed_mode_ignores_zoom() {
        let mut rt = HeadlessRuntime::new();
        let mut reg = LayerRegistry::new();
        let mut mgr = NaturalManager::new(NaturalConfig::default(), 1.0);
        mgr.set_enabled(&mut rt, &mut reg, NaturalFamily::Rivers, true);
        let (_, tier, limit) =
            expect_natural(mgr.set_mode(&mut rt, &mut reg, NaturalFamily::Rivers, LodMode::High));
        assert_eq!((tier, limit), (LodTier::High, 2400));
        assert!(!mgr.on_zoom(4.0));
    }

    #[test]
    fn stale_and_failed_responses_keep_current_data() {
        let mut rt = HeadlessRuntime::new();
        let mut reg = LayerRegistry::new();
        let mut mgr = NaturalManager::new(NaturalConfig::default(), 1.0);
        let family = NaturalFamily::Rivers;

        let (low, _, _) = expect_natural(mgr.set_enabled(&mut rt, &mut reg, family, true));
        mgr.on_zoom(6.0);
        let (high, _, _) = expect_natural(mgr.refresh(&mut rt, &mut reg, family));

        assert!(!mgr.apply(&mut rt, &mut reg, family, LodTier::Low, low.token, Ok(river("Rhine"))));
        assert!(mgr.is_cached(family, LodTier::Low));
        assert_eq!(mgr.applied_tier(family), None);

        let err = FetchError::Status {
            path: "/api/natural/rivers?lod=high&limit=2400".into(),
            status: 503,
        };
        assert!(!mgr.apply(&mut rt, &mut reg, family, LodTier::High, high.token, Err(err)));
        assert_eq!(rt.count_calls("set_source_data", "natural-rivers"), 0);
        assert_eq!(mgr.applied_tier(family), None);
    }

    #[test]
    fn response_for_abandoned_tier_is_only_cached() {
        let mut rt = HeadlessRuntime::new();
        let mut reg = LayerRegistry::new();
        let mut mgr = NaturalManager::new(NaturalConfig::default(), 1.0);
        let family = NaturalFamily::Rivers;

        let (low, tier, _) = expect_natural(mgr.set_enabled(&mut rt, &mut reg, family, true));
        mgr.apply(&mut rt, &mut reg, family, tier, low.token, Ok(river("Rhine")));
        assert!(mgr.on_zoom(7.0));
        let (high, _, _) = expect_natural(mgr.refresh(&mut rt, &mut reg, family));

        assert!(!mgr.on_zoom(1.0));
        assert!(!mgr.apply(&mut rt, &mut reg, family, LodTier::High, high.token, Ok(river("Indus"))));
        assert_eq!(mgr.applied_tier(family), Some(LodTier::Low));
        assert!(mgr.is_cached(family, LodTier::High));
        assert_eq!(rt.count_calls("set_source_data", "natural-rivers"), 1);

        // The abandoned tier is now served from cache.
        assert!(mgr.on_zoom(7.0));
        assert!(mgr.refresh(&mut rt, &mut reg, family).is_none());
        assert_eq!(mgr.applied_tier(family), Some(LodTier::High));
    }
}
