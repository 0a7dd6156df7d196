//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document deserializes into a
//! complete config. `validate` rejects values the engine cannot work with;
//! out-of-range bucket counts are clamped rather than rejected.

use layers::DEFAULT_STYLE_URL;
use layers::choropleth::{ChoroplethConfig, MAX_BUCKETS, MIN_BUCKETS};
use layers::natural::NaturalConfig;
use scene::CameraDefaults;
use serde::{Deserialize, Serialize};
use streaming::{AVAILABLE_YEARS, HistoricalProperties};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("api_base must not be empty")]
    EmptyApiBase,
    #[error("at least one historical year must be available")]
    NoYears,
    #[error("LOD breakpoints must be finite and increasing (med {med}, high {high})")]
    Breakpoints { med: f64, high: f64 },
    #[error("{field} must be a finite, non-negative number (got {value})")]
    NonNegative { field: &'static str, value: f64 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalConfig {
    pub properties: HistoricalProperties,
    /// Fill for territories without a derivable owner.
    pub fallback_color: String,
    pub fill_opacity: f64,
    /// Year shown when historical mode is first enabled.
    pub initial_year: i32,
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            properties: HistoricalProperties::default(),
            fallback_color: "#cccccc".to_string(),
            fill_opacity: 0.65,
            initial_year: 1914,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub source_url: String,
    pub tile_size: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            source_url: "mapbox://mapbox.mapbox-terrain-dem-v1".to_string(),
            tile_size: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingsConfig {
    pub source_url: String,
    pub source_layer: String,
    pub min_zoom: f64,
    pub color: String,
}

impl Default for BuildingsConfig {
    fn default() -> Self {
        Self {
            source_url: "mapbox://mapbox.mapbox-streets-v8".to_string(),
            source_layer: "building".to_string(),
            min_zoom: 15.0,
            color: "#aaaaaa".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub api_base: String,
    pub style_url: String,
    /// Vector tileset holding the country polygons.
    pub countries_url: String,
    pub available_years: Vec<i32>,
    pub choropleth: ChoroplethConfig,
    pub natural: NaturalConfig,
    pub camera: CameraDefaults,
    pub historical: HistoricalConfig,
    pub terrain: TerrainConfig,
    pub buildings: BuildingsConfig,
    pub hover_debounce_ms: u64,
    pub lod_debounce_ms: u64,
    pub rotation_deg_per_s: f64,
    /// Auto-rotation resumes this long after the last interaction.
    pub rotation_resume_ms: u64,
    /// Basemap layers hidden in minimal mode are those whose id contains
    /// one of these fragments.
    pub label_layer_markers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".to_string(),
            style_url: DEFAULT_STYLE_URL.to_string(),
            countries_url: "mapbox://mapbox.country-boundaries-v1".to_string(),
            available_years: AVAILABLE_YEARS.to_vec(),
            choropleth: ChoroplethConfig::default(),
            natural: NaturalConfig::default(),
            camera: CameraDefaults::default(),
            historical: HistoricalConfig::default(),
            terrain: TerrainConfig::default(),
            buildings: BuildingsConfig::default(),
            hover_debounce_ms: 50,
            lod_debounce_ms: 150,
            rotation_deg_per_s: 3.0,
            rotation_resume_ms: 4000,
            label_layer_markers: vec!["label".to_string(), "road".to_string()],
        }
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonNegative { field, value })
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::EmptyApiBase);
        }
        if self.style_url.trim().is_empty() {
            return Err(ConfigError::Empty { field: "style_url" });
        }
        if self.choropleth.code_property.is_empty() {
            return Err(ConfigError::Empty {
                field: "choropleth.code_property",
            });
        }
        if self.available_years.is_empty() {
            return Err(ConfigError::NoYears);
        }
        let b = self.natural.breakpoints;
        if !(b.med.is_finite() && b.high.is_finite() && b.med < b.high) {
            return Err(ConfigError::Breakpoints {
                med: b.med,
                high: b.high,
            });
        }
        non_negative("camera.fit_padding", self.camera.fit_padding)?;
        non_negative("camera.fallback_zoom", self.camera.fallback_zoom)?;
        non_negative("historical.fill_opacity", self.historical.fill_opacity)?;
        non_negative("choropleth.opacity", self.choropleth.opacity)?;
        non_negative("rotation_deg_per_s", self.rotation_deg_per_s)?;
        Ok(())
    }

    /// Bucket count after clamping into the supported range.
    pub fn effective_buckets(&self) -> usize {
        self.choropleth.buckets.clamp(MIN_BUCKETS, MAX_BUCKETS)
    }

    /// Choropleth settings with the bucket count clamped.
    pub fn choropleth_config(&self) -> ChoroplethConfig {
        ChoroplethConfig {
            buckets: self.effective_buckets(),
            ..self.choropleth.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ConfigError, EngineConfig};

    #[test]
    fn defaults_are_valid() {
        let c = EngineConfig::default();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.effective_buckets(), 7);
        assert_eq!(c.hover_debounce_ms, 50);
        assert_eq!(c.camera.fit_padding, 40.0);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let c: EngineConfig = serde_json::from_str(
            r#"{"api_base": "https://stats.example", "choropleth": {"buckets": 12},
                "natural": {"breakpoints": {"med": 2.5}}}"#,
        )
        .unwrap();
        assert_eq!(c.api_base, "https://stats.example");
        assert_eq!(c.effective_buckets(), 9);
        assert_eq!(c.choropleth_config().buckets, 9);
        assert_eq!(c.natural.breakpoints.med, 2.5);
        assert_eq!(c.natural.breakpoints.high, 5.5);
        assert_eq!(c.choropleth.source, "countries");
    }

    #[test]
    fn rejects_unusable_values() {
        let mut c = EngineConfig::default();
        c.natural.breakpoints.high = 2.0;
        assert!(matches!(c.validate(), Err(ConfigError::Breakpoints { .. })));

        let mut c = EngineConfig::default();
        c.available_years.clear();
        assert_eq!(c.validate(), Err(ConfigError::NoYears));

        let mut c = EngineConfig::default();
        c.camera.fit_padding = -1.0;
        assert_eq!(
            c.validate(),
            Err(ConfigError::NonNegative {
                field: "camera.fit_padding",
                value: -1.0
            })
        );
    }
}
