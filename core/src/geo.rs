//! Corridor geometry: Haversine distance and the 2 km membership test.

use crate::route::LatLng;

/// Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// How far an event may sit from the route anchors and still count, km.
pub const CORRIDOR_RADIUS_KM: f64 = 2.0;

/// Great-circle distance between two points in kilometres.
#[must_use]
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Midpoint of the straight segment between origin and destination.
///
/// Commute corridors are a few kilometres long, so the arithmetic mean is
/// indistinguishable from the geodesic midpoint at this scale.
#[must_use]
pub fn midpoint(a: LatLng, b: LatLng) -> LatLng {
    LatLng {
        latitude: (a.latitude + b.latitude) / 2.0,
        longitude: (a.longitude + b.longitude) / 2.0,
    }
}

/// Whether `point` lies within the corridor: at most 2.0 km from the
/// origin, the destination, or their midpoint.
#[must_use]
pub fn in_corridor(point: LatLng, origin: LatLng, destination: LatLng) -> bool {
    let mid = midpoint(origin, destination);
    haversine_km(point, origin) <= CORRIDOR_RADIUS_KM
        || haversine_km(point, destination) <= CORRIDOR_RADIUS_KM
        || haversine_km(point, mid) <= CORRIDOR_RADIUS_KM
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRE: LatLng = LatLng {
        latitude: 53.3498,
        longitude: -6.2603,
    };
    const GLASNEVIN: LatLng = LatLng {
        latitude: 53.3849,
        longitude: -6.2579,
    };

    #[test]
    fn haversine_known_distance() {
        // Spire of Dublin to Glasnevin is roughly 3.9 km.
        let d = haversine_km(SPIRE, GLASNEVIN);
        assert!((3.5..4.3).contains(&d), "got {d}");
    }

    #[test]
    fn zero_distance_to_self() {
        assert!(haversine_km(SPIRE, SPIRE) < 1e-9);
    }

    #[test]
    fn event_near_midpoint_is_in_corridor() {
        // Between the two anchors, ~0.1 km off the midpoint.
        let event = LatLng {
            latitude: 53.3674,
            longitude: -6.2591,
        };
        assert!(in_corridor(event, SPIRE, GLASNEVIN));
    }

    #[test]
    fn event_near_origin_is_in_corridor() {
        let event = LatLng {
            latitude: 53.3510,
            longitude: -6.2600,
        };
        assert!(in_corridor(event, SPIRE, GLASNEVIN));
    }

    #[test]
    fn far_event_is_outside_corridor() {
        // Howth, ~10 km east of all three anchors.
        let event = LatLng {
            latitude: 53.3870,
            longitude: -6.0650,
        };
        assert!(!in_corridor(event, SPIRE, GLASNEVIN));
    }
}
