//! Camera targeting for a selected country.
//!
//! Prefers fitting the country's bounding box around its area-weighted
//! centroid; anything unusable falls back to the raw click at a fixed zoom.

use foundation::{Geometry, LngLat, LngLatBounds, compute_bounding_box, compute_centroid};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDefaults {
    /// Screen-space padding (px) around fitted bounds.
    pub fit_padding: f64,
    pub fallback_zoom: f64,
    pub duration_ms: u64,
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            fit_padding: 40.0,
            fallback_zoom: 4.0,
            duration_ms: 1200,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CameraPlan {
    Fit {
        bounds: LngLatBounds,
        center: LngLat,
        padding: f64,
    },
    Fallback {
        center: LngLat,
        zoom: f64,
    },
}

impl CameraPlan {
    /// The plan to use when the runtime cannot fit `Fit` bounds.
    pub fn fallback(click: LngLat, defaults: &CameraDefaults) -> Self {
        CameraPlan::Fallback {
            center: click,
            zoom: defaults.fallback_zoom,
        }
    }
}

pub fn plan_camera(geometry: Option<&Geometry>, click: LngLat, defaults: &CameraDefaults) -> CameraPlan {
    let Some(geometry) = geometry else {
        debug!("selection without geometry, centering on click");
        return CameraPlan::fallback(click, defaults);
    };

    let measured = compute_bounding_box(geometry).and_then(|bounds| {
        let center = compute_centroid(geometry)?;
        Ok((bounds, center))
    });

    match measured {
        Ok((bounds, center)) => CameraPlan::Fit {
            bounds,
            center,
            padding: defaults.fit_padding,
        },
        Err(err) => {
            debug!(%err, "unusable selection geometry, centering on click");
            CameraPlan::fallback(click, defaults)
        }
    }
}
