use hemomatch_core::errors::{ConfigError, MatchError};
use hemomatch_core::types::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_MAX_RELEVANT_KM: f64 = 50.0;

/// Great-circle distance normalized against a relevance radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEngine {
    max_relevant_km: f64,
}

impl DistanceEngine {
    pub fn new(max_relevant_km: f64) -> Result<Self, ConfigError> {
        if !max_relevant_km.is_finite() || max_relevant_km <= 0.0 {
            return Err(ConfigError::InvalidRadius(max_relevant_km));
        }
        Ok(Self { max_relevant_km })
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, a: &GeoPoint, b: &GeoPoint) -> Result<f64, MatchError> {
        a.validate()?;
        b.validate()?;
        Ok(haversine_km(a, b))
    }

    /// Distance factor in [0, 1]: 0 when co-located, 1 at or beyond the
    /// relevance radius.
    pub fn factor(&self, a: &GeoPoint, b: &GeoPoint) -> Result<f64, MatchError> {
        let km = self.distance_km(a, b)?;
        Ok((km / self.max_relevant_km).min(1.0))
    }
}

impl Default for DistanceEngine {
    fn default() -> Self {
        Self {
            max_relevant_km: DEFAULT_MAX_RELEVANT_KM,
        }
    }
}

fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}
