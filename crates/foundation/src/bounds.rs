use serde::{Deserialize, Serialize};

/// A longitude/latitude pair in degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

/// Axis-aligned bounds in longitude/latitude degrees.
///
/// Ordering matches the runtime's `[minLng, minLat, maxLng, maxLat]` convention.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl LngLatBounds {
    pub const fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }
    }

    /// Bounds covering exactly one point.
    pub fn from_point(p: LngLat) -> Self {
        Self::new(p.lng, p.lat, p.lng, p.lat)
    }

    pub fn extend(&mut self, p: LngLat) {
        self.min_lng = self.min_lng.min(p.lng);
        self.min_lat = self.min_lat.min(p.lat);
        self.max_lng = self.max_lng.max(p.lng);
        self.max_lat = self.max_lat.max(p.lat);
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.min_lng + self.max_lng) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng >= self.min_lng && p.lng <= self.max_lng && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lng, self.min_lat, self.max_lng, self.max_lat]
    }
}

#[cfg(test)]
mod tests {
    use super::{LngLat, LngLatBounds};

    #[test]
    fn extend_grows_to_cover_points() {
        let mut b = LngLatBounds::from_point(LngLat::new(10.0, 5.0));
        b.extend(LngLat::new(-3.0, 8.0));
        b.extend(LngLat::new(4.0, -2.0));
        assert_eq!(b.to_array(), [-3.0, -2.0, 10.0, 8.0]);
        assert!(b.contains(LngLat::new(0.0, 0.0)));
        assert!(!b.contains(LngLat::new(11.0, 0.0)));
    }

    #[test]
    fn center_is_midpoint() {
        let b = LngLatBounds::new(-10.0, -4.0, 10.0, 6.0);
        assert_eq!(b.center(), LngLat::new(0.0, 1.0));
        assert_eq!(b.width(), 20.0);
        assert_eq!(b.height(), 10.0);
    }
}
