// Geographic Value Objects

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both components are finite numbers (not NaN / infinity).
    /// A request failing this check is unprocessable, not retryable.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great-circle distance to `other` in kilometers (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(59.9139, 10.7522);
        assert!(p.distance_km(&p) < 1e-9);
    }

    #[test]
    fn oslo_to_bergen_is_about_305_km() {
        let oslo = GeoPoint::new(59.9139, 10.7522);
        let bergen = GeoPoint::new(60.3913, 5.3221);
        let d = p_round(oslo.distance_km(&bergen));
        assert!((300.0..320.0).contains(&d), "got {d}");
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_finite());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_finite());
        assert!(GeoPoint::new(0.0, 0.0).is_finite());
    }

    fn p_round(v: f64) -> f64 {
        (v * 10.0).round() / 10.0
    }
}
