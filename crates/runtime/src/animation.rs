/// Continuous globe spin driven by animation frames.
///
/// The loop only measures elapsed time; the caller applies the returned
/// longitude delta to the camera. User interaction pauses the loop, and the
/// first frame after a pause yields no movement so the globe never jumps.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationLoop {
    degrees_per_second: f64,
    last_ms: Option<u64>,
    paused: bool,
}

impl RotationLoop {
    pub fn new(degrees_per_second: f64) -> Self {
        Self {
            degrees_per_second,
            last_ms: None,
            paused: false,
        }
    }

    pub fn degrees_per_second(&self) -> f64 {
        self.degrees_per_second
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.last_ms = None;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.last_ms = None;
    }

    /// Longitude delta in degrees accumulated since the previous frame.
    pub fn step(&mut self, now_ms: u64) -> Option<f64> {
        if self.paused {
            return None;
        }
        let last = self.last_ms.replace(now_ms)?;
        let dt_s = now_ms.saturating_sub(last) as f64 / 1000.0;
        (dt_s > 0.0).then(|| dt_s * self.degrees_per_second)
    }
}

/// Wraps a longitude into `[-180, 180)`.
pub fn wrap_longitude(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}
