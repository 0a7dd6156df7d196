//! What the engine listens for and what it schedules.

use foundation::{FeatureRef, LngLat};
use layers::RenderedFeature;
use serde::Serialize;

pub const COUNTRIES_FILL: &str = "countries-fill";
pub const COUNTRIES_LINE: &str = "countries-line";

pub const HOVER_SLOT: &str = "hover";
pub const LOD_SLOT: &str = "lod";
pub const ROTATION_SLOT: &str = "rotation";

/// Listener payload kept in the lifecycle ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Handler {
    StyleLoaded,
    CountryHover,
    CountryLeave,
    CountryClick,
    /// Unscoped: a click that misses every territory clears the highlight.
    HistoricalClick,
    ZoomChanged,
}

/// Deferred work owned by the timer queue or the frame slot.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    ApplyHover(FeatureRef),
    RefreshLod,
    SetYear(i32),
    ResumeRotation,
}

/// Passed to the host when a country is selected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryClick {
    pub code: String,
    pub name: String,
    pub lng_lat: LngLat,
}

pub type CountryClickCallback = Box<dyn FnMut(&CountryClick)>;

/// First feature rendered by `layer`.
pub fn first_on_layer<'a>(features: &'a [RenderedFeature], layer: &str) -> Option<&'a RenderedFeature> {
    features.iter().find(|f| f.layer == layer)
}

/// Country code of a rendered country feature.
pub fn country_code(feature: &RenderedFeature, code_property: &str) -> Option<String> {
    feature
        .feature
        .str_property(code_property)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use foundation::{Feature, FeatureId};

    use super::{country_code, first_on_layer};
    use layers::RenderedFeature;

    fn rendered(layer: &str, code: Option<&str>) -> RenderedFeature {
        let mut feature = Feature::new(Some(FeatureId::Number(4)), None);
        if let Some(code) = code {
            feature = feature.with_property("iso", code);
        }
        RenderedFeature {
            layer: layer.to_string(),
            source: "countries".to_string(),
            source_layer: None,
            feature,
        }
    }

    #[test]
    fn picks_feature_on_requested_layer() {
        let features = vec![rendered("water", None), rendered("countries-fill", Some("NOR"))];
        let hit = first_on_layer(&features, "countries-fill").unwrap();
        assert_eq!(country_code(hit, "iso").as_deref(), Some("NOR"));
        assert!(first_on_layer(&features, "historical-fill").is_none());
        assert_eq!(country_code(&features[0], "iso"), None);
    }
}
