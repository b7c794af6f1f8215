use crate::models::{OfficeLocation, WorkLocation};
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

pub const WARNING_OFFICE_NOT_SET: &str = "office location not set";
pub const WARNING_NOT_AT_OFFICE: &str = "not at office location";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinates { latitude, longitude }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_meters: f64,
}

impl Geofence {
    /// The office's own radius wins over the configured default.
    pub fn for_office(office: &OfficeLocation, default_radius_meters: f64) -> Self {
        Geofence {
            center: Coordinates::new(office.latitude, office.longitude),
            radius_meters: office.radius_meters.unwrap_or(default_radius_meters),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceVerdict {
    pub location: WorkLocation,
    pub warning: Option<String>,
    pub distance_meters: Option<f64>,
}

/// Great-circle distance using the haversine formula.
pub fn distance_meters(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

pub fn classify(position: Coordinates, fence: Option<&Geofence>) -> GeofenceVerdict {
    let Some(fence) = fence else {
        return GeofenceVerdict {
            location: WorkLocation::Home,
            warning: Some(WARNING_OFFICE_NOT_SET.to_string()),
            distance_meters: None,
        };
    };

    let distance = distance_meters(position, fence.center);
    if distance <= fence.radius_meters {
        GeofenceVerdict {
            location: WorkLocation::Office,
            warning: None,
            distance_meters: Some(distance),
        }
    } else {
        GeofenceVerdict {
            location: WorkLocation::Home,
            warning: Some(WARNING_NOT_AT_OFFICE.to_string()),
            distance_meters: Some(distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cairo_office() -> Geofence {
        Geofence {
            center: Coordinates::new(30.0444, 31.2357),
            radius_meters: 50.0,
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let point = Coordinates::new(30.0444, 31.2357);
        assert!(distance_meters(point, point).abs() < 1e-9);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_meters(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn position_at_office_is_classified_office() {
        let verdict = classify(Coordinates::new(30.0444, 31.2357), Some(&cairo_office()));
        assert_eq!(verdict.location, WorkLocation::Office);
        assert_eq!(verdict.warning, None);
    }

    #[test]
    fn position_200m_away_is_remote_with_warning() {
        // 0.0018 degrees of latitude is roughly 200 m.
        let verdict = classify(Coordinates::new(30.0462, 31.2357), Some(&cairo_office()));
        let distance = verdict.distance_meters.unwrap();
        assert!(distance > 190.0 && distance < 210.0, "got {distance}");
        assert_eq!(verdict.location, WorkLocation::Home);
        assert_eq!(verdict.warning.as_deref(), Some(WARNING_NOT_AT_OFFICE));
    }

    #[test]
    fn missing_office_defaults_to_home() {
        let verdict = classify(Coordinates::new(30.0444, 31.2357), None);
        assert_eq!(verdict.location, WorkLocation::Home);
        assert_eq!(verdict.warning.as_deref(), Some(WARNING_OFFICE_NOT_SET));
    }

    #[test]
    fn radius_is_a_parameter() {
        let wide = Geofence {
            radius_meters: 250.0,
            ..cairo_office()
        };
        let verdict = classify(Coordinates::new(30.0462, 31.2357), Some(&wide));
        assert_eq!(verdict.location, WorkLocation::Office);
    }
}
