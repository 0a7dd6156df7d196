//! Year-indexed boundary snapshots with last-request-wins resolution.
//!
//! Requests snap to the nearest available year, hit the session cache when
//! they can and otherwise emit a `FetchJob`. Successful responses are colored
//! and cached even when a newer request has superseded them; only the
//! response carrying the current token is ever displayed.

use foundation::{
    Feature, FeatureCollection, canonicalize_name, color_from_key, derive_owner_from_adjective,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::SnapshotCache;
use crate::pipeline::{FetchJob, FetchKind};
use crate::request::{RequestCounter, RequestToken};
use crate::source::FetchError;

pub const AVAILABLE_YEARS: &[i32] = &[
    -2000, -1000, -500, -323, -200, -1, 100, 400, 600, 800, 1000, 1279, 1492, 1530, 1650, 1715,
    1783, 1815, 1880, 1914, 1920, 1938, 1945, 1994,
];

/// Nearest available year; equidistant requests resolve to the lower year.
pub fn snap_year(requested: i32, available: &[i32]) -> Option<i32> {
    available
        .iter()
        .copied()
        .min_by_key(|&y| ((i64::from(y) - i64::from(requested)).abs(), y))
}

/// Property names read from and written to historical features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalProperties {
    /// Explicit owner properties, in priority order.
    pub owner_keys: Vec<String>,
    pub name_key: String,
    pub owner_out: String,
    pub color_out: String,
}

impl Default for HistoricalProperties {
    fn default() -> Self {
        Self {
            owner_keys: vec!["SUBJECTO".to_string(), "PARTOF".to_string()],
            name_key: "NAME".to_string(),
            owner_out: "OWNER".to_string(),
            color_out: "COLOR".to_string(),
        }
    }
}

/// Canonical owner of a historical territory.
pub fn derive_owner(feature: &Feature, props: &HistoricalProperties) -> Option<String> {
    let explicit = props
        .owner_keys
        .iter()
        .find_map(|key| feature.str_property(key))
        .map(canonicalize_name);
    if explicit.is_some() {
        return explicit;
    }

    let name = feature.str_property(&props.name_key)?;
    let owner = derive_owner_from_adjective(name).unwrap_or_else(|| canonicalize_name(name));
    (!owner.is_empty()).then_some(owner)
}

/// Stamps `OWNER` and `COLOR` onto every feature whose owner is derivable.
pub fn color_snapshot(mut data: FeatureCollection, props: &HistoricalProperties) -> FeatureCollection {
    for feature in &mut data.features {
        if let Some(owner) = derive_owner(feature, props) {
            let color = color_from_key(&owner);
            feature.properties.insert(props.owner_out.clone(), owner.into());
            feature.properties.insert(props.color_out.clone(), color.into());
        }
    }
    data
}

/// What the caller must do next after a timeline transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineStep {
    /// Replace the displayed snapshot.
    Apply { year: i32, data: FeatureCollection },
    /// Nothing cached; run this job and hand the outcome to `resolve`.
    Fetch(FetchJob),
    /// The request failed but a snapshot is already on screen.
    KeepDisplayed,
    /// Superseded by a newer request.
    Stale,
    /// No available years are configured.
    Unavailable,
}

#[derive(Debug)]
pub struct HistoricalTimeline {
    available: Vec<i32>,
    props: HistoricalProperties,
    cache: SnapshotCache<i32, FeatureCollection>,
    counter: RequestCounter,
    requested_year: Option<i32>,
    displayed_year: Option<i32>,
}

impl HistoricalTimeline {
    pub fn new(mut available: Vec<i32>, props: HistoricalProperties) -> Self {
        available.sort_unstable();
        available.dedup();
        Self {
            available,
            props,
            cache: SnapshotCache::new(),
            counter: RequestCounter::new(),
            requested_year: None,
            displayed_year: None,
        }
    }

    pub fn available_years(&self) -> &[i32] {
        &self.available
    }

    pub fn properties(&self) -> &HistoricalProperties {
        &self.props
    }

    pub fn requested_year(&self) -> Option<i32> {
        self.requested_year
    }

    pub fn displayed_year(&self) -> Option<i32> {
        self.displayed_year
    }

    pub fn cached_years(&self) -> impl Iterator<Item = i32> + '_ {
        self.cache.keys().copied()
    }

    pub fn cache(&self) -> &SnapshotCache<i32, FeatureCollection> {
        &self.cache
    }

    pub fn snapshot(&self, year: i32) -> Option<&FeatureCollection> {
        self.cache.peek(&year)
    }

    /// Starts a new request generation for `year`.
    pub fn request(&mut self, year: i32) -> TimelineStep {
        let Some(snapped) = snap_year(year, &self.available) else {
            return TimelineStep::Unavailable;
        };
        let token = self.counter.next();
        self.requested_year = Some(snapped);

        if let Some(data) = self.cache.get(&snapped) {
            debug!(year = snapped, "historical cache hit");
            let data = data.clone();
            self.displayed_year = Some(snapped);
            return TimelineStep::Apply { year: snapped, data };
        }

        debug!(year = snapped, token = token.0, "historical cache miss");
        TimelineStep::Fetch(FetchJob::new(token, FetchKind::History { year: snapped }))
    }

    /// Makes every in-flight request stale without issuing a new one.
    pub fn invalidate(&mut self) {
        self.counter.next();
        self.requested_year = None;
    }

    /// Forgets what is on screen, e.g. after the historical layers were hidden.
    pub fn clear_displayed(&mut self) {
        self.displayed_year = None;
    }

    pub fn resolve(
        &mut self,
        token: RequestToken,
        year: i32,
        result: Result<FeatureCollection, FetchError>,
    ) -> TimelineStep {
        let current = self.counter.is_current(token);
        match result {
            Ok(raw) => {
                let colored = color_snapshot(raw, &self.props);
                self.cache.insert(year, colored.clone());
                if !current {
                    debug!(year, token = token.0, "cached stale historical response");
                    return TimelineStep::Stale;
                }
                self.displayed_year = Some(year);
                TimelineStep::Apply { year, data: colored }
            }
            Err(err) if current => {
                warn!(year, %err, "historical snapshot fetch failed");
                if self.displayed_year.is_some() {
                    TimelineStep::KeepDisplayed
                } else {
                    TimelineStep::Apply {
                        year,
                        data: FeatureCollection::default(),
                    }
                }
            }
            Err(err) => {
                debug!(year, %err, "ignored failure of stale historical request");
                TimelineStep::Stale
            }
        }
    }
}
