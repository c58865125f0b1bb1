/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
///
/// # Returns
/// Distance in kilometers
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Which ceiling admitted a distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadiusTier {
    Base(f64),
    /// Index into the ascending adaptive list, and the radius used
    Adaptive(usize, f64),
}

impl RadiusTier {
    pub fn radius_km(&self) -> f64 {
        match self {
            RadiusTier::Base(r) | RadiusTier::Adaptive(_, r) => *r,
        }
    }
}

/// Find the first ceiling that admits `distance_km`
///
/// The base radius is tried first, then each adaptive radius in the order
/// given; callers pass them sorted ascending. `None` means the distance
/// exceeds every ceiling.
pub fn resolve_radius(distance_km: f64, base_radius_km: f64, adaptive_km: &[f64]) -> Option<RadiusTier> {
    if distance_km <= base_radius_km {
        return Some(RadiusTier::Base(base_radius_km));
    }

    adaptive_km
        .iter()
        .enumerate()
        .find(|(_, radius)| distance_km <= **radius)
        .map(|(idx, radius)| RadiusTier::Adaptive(idx, *radius))
}
