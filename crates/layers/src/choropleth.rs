//! Quantile choropleths over the latest value of one indicator per country.
//!
//! Each metric owns one fill layer on the shared country source. Layers are
//! installed once and then only re-painted, re-filtered or toggled, so
//! switching metrics costs one visibility change per installed metric.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use streaming::{FetchError, FetchJob, FetchKind, IndicatorTable, RequestCounter, RequestToken};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::expr;
use crate::map_runtime::MapRuntime;
use crate::registry::LayerRegistry;
use crate::spec::{LayerKind, LayerSpec};

pub const MIN_BUCKETS: usize = 5;
pub const MAX_BUCKETS: usize = 9;
pub const DEFAULT_BUCKETS: usize = 7;
pub const TRANSPARENT: &str = "rgba(0,0,0,0)";

type Palette = [&'static str; 9];

const BLUES: Palette = [
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#4292c6", "#2171b5", "#08519c", "#08306b",
];
const GREENS: Palette = [
    "#f7fcf5", "#e5f5e0", "#c7e9c0", "#a1d99b", "#74c476", "#41ab5d", "#238b45", "#006d2c", "#00441b",
];
const REDS: Palette = [
    "#fff5f0", "#fee0d2", "#fcbba1", "#fc9272", "#fb6a4a", "#ef3b2c", "#cb181d", "#a50f15", "#67000d",
];
const PURPLES: Palette = [
    "#fcfbfd", "#efedf5", "#dadaeb", "#bcbddc", "#9e9ac8", "#807dba", "#6a51a3", "#54278f", "#3f007d",
];
const ORANGES: Palette = [
    "#fff5eb", "#fee6ce", "#fdd0a2", "#fdae6b", "#fd8d3c", "#f16913", "#d94801", "#a63603", "#7f2704",
];
const YL_GN_BU: Palette = [
    "#ffffd9", "#edf8b1", "#c7e9b4", "#7fcdbb", "#41b6c4", "#1d91c0", "#225ea8", "#253494", "#081d58",
];
const YL_OR_RD: Palette = [
    "#ffffcc", "#ffeda0", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#bd0026", "#800026",
];
const BU_PU: Palette = [
    "#f7fcfd", "#e0ecf4", "#bfd3e6", "#9ebcda", "#8c96c6", "#8c6bb1", "#88419d", "#810f7c", "#4d004b",
];
const PU_BU_GN: Palette = [
    "#fff7fb", "#ece2f0", "#d0d1e6", "#a6bddb", "#67a9cf", "#3690c0", "#02818a", "#016c59", "#014636",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Gdp,
    GdpPerCapita,
    Inflation,
    Gini,
    Exports,
    LifeExpectancy,
    MilitaryExpenditure,
    DemocracyIndex,
    TradeGdp,
}

struct MetricInfo {
    slug: &'static str,
    layer_id: &'static str,
    label: &'static str,
    palette: &'static Palette,
    log_scale: bool,
}

const METRICS: [MetricInfo; 9] = [
    MetricInfo {
        slug: "gdp",
        layer_id: "choropleth-gdp",
        label: "GDP (current US$)",
        palette: &GREENS,
        log_scale: true,
    },
    MetricInfo {
        slug: "gdp-per-capita",
        layer_id: "choropleth-gdp-per-capita",
        label: "GDP per capita (US$)",
        palette: &BLUES,
        log_scale: false,
    },
    MetricInfo {
        slug: "inflation",
        layer_id: "choropleth-inflation",
        label: "Inflation (%)",
        palette: &YL_OR_RD,
        log_scale: false,
    },
    MetricInfo {
        slug: "gini",
        layer_id: "choropleth-gini",
        label: "Gini index",
        palette: &PURPLES,
        log_scale: false,
    },
    MetricInfo {
        slug: "exports",
        layer_id: "choropleth-exports",
        label: "Exports (US$)",
        palette: &ORANGES,
        log_scale: true,
    },
    MetricInfo {
        slug: "life-expectancy",
        layer_id: "choropleth-life-expectancy",
        label: "Life expectancy (years)",
        palette: &YL_GN_BU,
        log_scale: false,
    },
    MetricInfo {
        slug: "military-expenditure",
        layer_id: "choropleth-military-expenditure",
        label: "Military expenditure (US$)",
        palette: &REDS,
        log_scale: true,
    },
    MetricInfo {
        slug: "democracy-index",
        layer_id: "choropleth-democracy-index",
        label: "Democracy index",
        palette: &BU_PU,
        log_scale: false,
    },
    MetricInfo {
        slug: "trade-gdp",
        layer_id: "choropleth-trade-gdp",
        label: "Trade (% of GDP)",
        palette: &PU_BU_GN,
        log_scale: false,
    },
];

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Gdp,
        Metric::GdpPerCapita,
        Metric::Inflation,
        Metric::Gini,
        Metric::Exports,
        Metric::LifeExpectancy,
        Metric::MilitaryExpenditure,
        Metric::DemocracyIndex,
        Metric::TradeGdp,
    ];

    fn info(self) -> &'static MetricInfo {
        &METRICS[self as usize]
    }

    pub fn slug(self) -> &'static str {
        self.info().slug
    }

    pub fn layer_id(self) -> &'static str {
        self.info().layer_id
    }

    pub fn label(self) -> &'static str {
        self.info().label
    }

    pub fn palette(self) -> &'static [&'static str] {
        self.info().palette
    }

    pub fn is_log_scale(self) -> bool {
        self.info().log_scale
    }

    pub fn from_slug(slug: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.slug() == slug)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric `{0}`")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::from_slug(s.trim()).ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

pub fn clamp_buckets(k: usize) -> usize {
    k.clamp(MIN_BUCKETS, MAX_BUCKETS)
}

/// `k - 1` quantile cut points over ascending `sorted`, by linear
/// interpolation between order statistics. Cut points at or below the
/// minimum, or not above the previous cut point, are dropped.
pub fn quantile_thresholds(sorted: &[f64], k: usize) -> Vec<f64> {
    let Some(&min) = sorted.first() else {
        return Vec::new();
    };
    if sorted.len() < 2 || k < 2 {
        return Vec::new();
    }

    let last = (sorted.len() - 1) as f64;
    let mut out: Vec<f64> = Vec::with_capacity(k - 1);
    for i in 1..k {
        let pos = (i as f64 / k as f64) * last;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let t = sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64);
        if t <= min || out.last().is_some_and(|&prev| t <= prev) {
            continue;
        }
        out.push(t);
    }
    out
}

/// Lower-inclusive bucket lookup: a value equal to a threshold belongs to
/// the bucket above it.
pub fn bucket_index(thresholds: &[f64], value: f64) -> usize {
    thresholds.partition_point(|t| *t <= value)
}

/// `count` colors spread evenly across `palette`, light to dark.
pub fn palette_colors(palette: &[&'static str], count: usize) -> Vec<&'static str> {
    let Some(top) = palette.len().checked_sub(1) else {
        return Vec::new();
    };
    match count {
        0 => Vec::new(),
        1 => vec![palette[top / 2]],
        n => (0..n)
            .map(|i| palette[((i * top) as f64 / (n - 1) as f64).round() as usize])
            .collect(),
    }
}

/// Short human form: `1.2K`, `3.4M`, `72`, `0.46`.
pub fn format_compact(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e12 {
        (value / 1e12, "T")
    } else if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };
    let decimals = if suffix.is_empty() && abs < 10.0 { 2 } else { 1 };
    let mut text = format!("{scaled:.decimals$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    format!("{text}{suffix}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Immutable result of one bucketing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoroplethSpec {
    pub metric: Metric,
    /// Country code → fill color. Countries without data are absent.
    pub colors: BTreeMap<String, String>,
    pub legend: Vec<LegendEntry>,
    pub fallback_color: String,
}

impl ChoroplethSpec {
    pub fn fill_color_expr(&self, code_property: &str) -> Value {
        expr::match_property(
            code_property,
            self.colors.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &self.fallback_color,
        )
    }

    pub fn filter_expr(&self, code_property: &str) -> Value {
        expr::in_literal(code_property, self.colors.keys().map(String::as_str))
    }
}

pub fn build_choropleth<I>(metric: Metric, values: I, buckets: usize) -> ChoroplethSpec
where
    I: IntoIterator<Item = (String, Option<f64>)>,
{
    let log = metric.is_log_scale();
    let transformed: Vec<(String, f64)> = values
        .into_iter()
        .filter_map(|(code, v)| {
            let v = v.filter(|v| v.is_finite())?;
            if log {
                (v > 0.0).then(|| (code, v.log10()))
            } else {
                Some((code, v))
            }
        })
        .collect();

    let mut spec = ChoroplethSpec {
        metric,
        colors: BTreeMap::new(),
        legend: Vec::new(),
        fallback_color: TRANSPARENT.to_string(),
    };
    if transformed.is_empty() {
        return spec;
    }

    let mut sorted: Vec<f64> = transformed.iter().map(|(_, v)| *v).collect();
    sorted.sort_by(f64::total_cmp);
    let thresholds = quantile_thresholds(&sorted, clamp_buckets(buckets));
    let colors = palette_colors(metric.palette(), thresholds.len() + 1);

    for (code, v) in &transformed {
        spec.colors
            .insert(code.clone(), colors[bucket_index(&thresholds, *v)].to_string());
    }

    let original = |v: f64| if log { 10f64.powf(v) } else { v };
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    for (i, color) in colors.iter().enumerate() {
        let lo = if i == 0 { min } else { thresholds[i - 1] };
        let hi = thresholds.get(i).copied().unwrap_or(max);
        let (lo, hi) = (original(lo), original(hi));
        let label = if lo == hi {
            format_compact(lo)
        } else {
            format!("{} - {}", format_compact(lo), format_compact(hi))
        };
        spec.legend.push(LegendEntry {
            label,
            color: color.to_string(),
            min: Some(lo),
            max: Some(hi),
        });
    }
    spec
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoroplethConfig {
    pub buckets: usize,
    pub source: String,
    pub source_layer: Option<String>,
    pub code_property: String,
    /// Choropleth fills are inserted below this layer.
    pub before: Option<String>,
    pub opacity: f64,
}

impl Default for ChoroplethConfig {
    fn default() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            source: "countries".to_string(),
            source_layer: Some("country_boundaries".to_string()),
            code_property: "iso_3166_1_alpha_3".to_string(),
            before: Some("countries-line".to_string()),
            opacity: 0.75,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChoroplethManager {
    config: ChoroplethConfig,
    active: Option<Metric>,
    suppressed: bool,
    installed: BTreeMap<Metric, ChoroplethSpec>,
    in_flight: BTreeSet<Metric>,
    tokens: BTreeMap<Metric, RequestCounter>,
}

impl ChoroplethManager {
    pub fn new(config: ChoroplethConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn active(&self) -> Option<Metric> {
        self.active
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn spec(&self, metric: Metric) -> Option<&ChoroplethSpec> {
        self.installed.get(&metric)
    }

    /// Legend of the active metric once its data has landed.
    pub fn legend(&self) -> Option<&[LegendEntry]> {
        let metric = self.active?;
        self.installed.get(&metric).map(|s| s.legend.as_slice())
    }

    fn request(&mut self, metric: Metric) -> FetchJob {
        let token = self.tokens.entry(metric).or_default().next();
        self.in_flight.insert(metric);
        FetchJob::new(
            token,
            FetchKind::Indicator {
                slug: metric.slug(),
            },
        )
    }

    /// Shows `metric` (or nothing) and hides every other metric. Returns a
    /// fetch when the metric has neither data nor a request in flight.
    pub fn set_active<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        metric: Option<Metric>,
    ) -> Option<FetchJob> {
        if self.active != metric {
            info!(metric = ?metric, "active choropleth changed");
        }
        self.active = metric;
        self.sync_visibility(rt, registry);
        let metric = metric?;
        if self.installed.contains_key(&metric) || self.in_flight.contains(&metric) {
            return None;
        }
        Some(self.request(metric))
    }

    /// Re-requests `metric`, superseding any request in flight.
    pub fn refresh(&mut self, metric: Metric) -> FetchJob {
        self.request(metric)
    }

    /// Hides every choropleth while set, without forgetting the active metric.
    pub fn set_suppressed<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        suppressed: bool,
    ) {
        self.suppressed = suppressed;
        self.sync_visibility(rt, registry);
    }

    fn is_current(&self, metric: Metric, token: RequestToken) -> bool {
        self.tokens.get(&metric).is_some_and(|c| c.is_current(token))
    }

    /// Installs or repaints the layer for `metric` from fresh values.
    pub fn apply<R: MapRuntime + ?Sized>(
        &mut self,
        rt: &mut R,
        registry: &mut LayerRegistry,
        metric: Metric,
        token: RequestToken,
        table: &IndicatorTable,
    ) -> bool {
        if !self.is_current(metric, token) {
            debug!(%metric, token = token.0, "dropping stale indicator response");
            return false;
        }
        self.in_flight.remove(&metric);

        let spec = build_choropleth(
            metric,
            table.iter().map(|(code, p)| (code.clone(), p.value)),
            self.config.buckets,
        );
        let code = self.config.code_property.as_str();
        let fill = spec.fill_color_expr(code);
        let filter = spec.filter_expr(code);
        let layer_id = metric.layer_id();

        if registry.layer(layer_id).is_some() {
            registry.set_paint(rt, layer_id, "fill-color", fill);
            registry.set_filter(rt, layer_id, Some(filter));
        } else {
            let mut layer = LayerSpec::new(layer_id, LayerKind::Fill, self.config.source.as_str())
                .paint("fill-color", fill)
                .paint("fill-opacity", self.config.opacity)
                .filter(filter)
                .before(self.config.before.as_deref())
                .visible(false);
            if let Some(source_layer) = &self.config.source_layer {
                layer = layer.source_layer(source_layer.as_str());
            }
            registry.ensure_layer(rt, layer);
        }

        debug!(%metric, countries = spec.colors.len(), buckets = spec.legend.len(), "choropleth built");
        self.installed.insert(metric, spec);
        self.sync_visibility(rt, registry);
        true
    }

    /// Keeps whatever is installed; the failure is only logged.
    pub fn fail(&mut self, metric: Metric, token: RequestToken, err: &FetchError) {
        if !self.is_current(metric, token) {
            debug!(%metric, %err, "ignored failure of stale indicator request");
            return;
        }
        self.in_flight.remove(&metric);
        warn!(%metric, %err, "indicator fetch failed");
    }

    pub fn sync_visibility<R: MapRuntime + ?Sized>(&self, rt: &mut R, registry: &mut LayerRegistry) {
        for metric in self.installed.keys() {
            let visible = !self.suppressed && self.active == Some(*metric);
            registry.set_visibility(rt, metric.layer_id(), visible);
        }
    }
}
