//! Coordinate projection and distance helpers
//!
//! Route geometry is stored as WGS84 `Coord { x: lon, y: lat }`. Distances used for the
//! line gradient are measured in Web Mercator meters, the same planar space the map
//! draws in, so offsets line up with what is rendered on screen.

use geo::{Coord, Point};

/// Web Mercator half extent in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6371000.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// # Arguments
/// * `lat` - Latitude in degrees (-85.05 to 85.05)
/// * `lon` - Longitude in degrees (-180 to 180)
///
/// # Returns
/// A `Point<f64>` with x (easting) and y (northing) in meters
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Point::new(x, y)
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Project a lon/lat coordinate into Web Mercator meters
#[inline(always)]
pub fn coord_to_mercator(coord: Coord<f64>) -> Coord<f64> {
    wgs84_to_mercator(coord.y, coord.x).into()
}

/// Inverse of [`coord_to_mercator`]
#[inline(always)]
pub fn mercator_to_coord(coord: Coord<f64>) -> Coord<f64> {
    let (lat, lon) = mercator_to_wgs84(coord.x, coord.y);
    Coord { x: lon, y: lat }
}

/// Planar distance between two lon/lat coordinates in Web Mercator meters
///
/// Not geodesic: at high latitudes this overstates ground distance, which is what
/// the renderer does too when it maps line progress onto the drawn line.
#[inline]
pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let a = coord_to_mercator(a);
    let b = coord_to_mercator(b);
    (a.x - b.x).hypot(a.y - b.y)
}

/// Great-circle distance between two lon/lat coordinates in meters
#[inline]
pub fn haversine_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lat = (b.y - a.y).to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Number of vertices of `line` lying strictly beyond `traveled` meters along it
///
/// Distance along the line is measured with the haversine formula since progress
/// providers report traveled distance in ground meters. Returns 0 once `traveled`
/// reaches or exceeds the line length.
pub fn count_points_beyond(line: &[Coord<f64>], traveled: f64) -> usize {
    let mut along = 0.0;
    let mut remaining = 0;
    for (i, coord) in line.iter().enumerate() {
        if i > 0 {
            along += haversine_distance(line[i - 1], *coord);
        }
        if along > traveled {
            remaining += 1;
        }
    }
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wgs84_to_mercator_origin() {
        let point = wgs84_to_mercator(0.0, 0.0);
        assert!((point.x() - 0.0).abs() < 0.01);
        assert!((point.y() - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_mercator_to_wgs84_roundtrip() {
        let coord = Coord {
            x: -0.1278,
            y: 51.5074,
        };
        let back = mercator_to_coord(coord_to_mercator(coord));
        assert!((coord.x - back.x).abs() < 0.0001);
        assert!((coord.y - back.y).abs() < 0.0001);
    }

    #[test]
    fn test_planar_distance_matches_haversine_at_equator() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 0.001, y: 0.0 };
        let planar = planar_distance(a, b);
        let ground = haversine_distance(a, b);
        // Web Mercator is true to scale along the equator
        assert!((planar - ground).abs() / ground < 0.01);
    }

    #[test]
    fn test_planar_distance_stretches_at_high_latitude() {
        let a = Coord { x: 0.0, y: 60.0 };
        let b = Coord { x: 0.001, y: 60.0 };
        // Scale factor at 60 degrees is 1 / cos(60) = 2
        let ratio = planar_distance(a, b) / haversine_distance(a, b);
        assert!((ratio - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_count_points_beyond() {
        let line = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.001, y: 0.0 },
            Coord { x: 0.002, y: 0.0 },
            Coord { x: 0.003, y: 0.0 },
        ];
        let segment = haversine_distance(line[0], line[1]);

        assert_eq!(count_points_beyond(&line, 0.0), 3);
        assert_eq!(count_points_beyond(&line, segment * 1.5), 2);
        assert_eq!(count_points_beyond(&line, segment * 10.0), 0);
        assert_eq!(count_points_beyond(&[], 0.0), 0);
    }
}
