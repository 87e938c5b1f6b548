//! Geographic value types, great-circle distance and the geofence predicate.
//!
//! Two distance bases live here and are never mixed in one comparison:
//! dedup and prune radii are great-circle meters ([`haversine_distance`]),
//! while [`Geofence`] compares squared planar degree offsets, with longitude
//! scaled by the cosine of the fence center's latitude.

use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mean earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;


#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(*self, *other)
    }

    /// The point reached by moving `north_m` meters along the meridian and
    /// `east_m` meters along the parallel.
    pub fn offset(&self, north_m: f64, east_m: f64) -> GeoPoint {
        let dlat = north_m / EARTH_RADIUS_M;
        let dlon = east_m / (EARTH_RADIUS_M * self.latitude.to_radians().cos());
        GeoPoint::new(
            self.latitude + dlat.to_degrees(),
            self.longitude + dlon.to_degrees(),
        )
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

impl FromStr for GeoPoint {
    type Err = CrawlError;

    /// Parses `"lat,lon"` (whitespace around either number is allowed).
    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| CrawlError::Parse(format!("expected 'lat,lon', got '{}'", s)))?;

        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| CrawlError::Parse(format!("bad latitude '{}': {}", lat.trim(), e)))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|e| CrawlError::Parse(format!("bad longitude '{}': {}", lon.trim(), e)))?;

        let point = GeoPoint::new(latitude, longitude);
        if !point.is_valid() {
            return Err(CrawlError::Parse(format!("coordinates out of range: {}", s)));
        }
        Ok(point)
    }
}

pub fn haversine_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Latitude/longitude box enclosing every point within a radius of a center.
///
/// Used as an index-friendly prefilter before the exact haversine check. The
/// box is padded by one percent so points on the circle edge are never lost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_m: f64) -> Self {
        let padded = radius_m.max(0.0) * 1.01;
        let dlat = (padded / EARTH_RADIUS_M).to_degrees();
        let cos_lat = center.latitude.to_radians().cos().abs().max(1e-6);
        let dlon = (padded / (EARTH_RADIUS_M * cos_lat)).to_degrees().min(180.0);

        Self {
            min_lat: center.latitude - dlat,
            max_lat: center.latitude + dlat,
            min_lon: center.longitude - dlon,
            max_lon: center.longitude + dlon,
        }
    }

    /// The box's longitude span as two closed ranges inside `[-180, 180]`.
    ///
    /// A box crossing the antimeridian is split in two; otherwise both
    /// ranges are the same.
    pub fn longitude_ranges(&self) -> [(f64, f64); 2] {
        if self.max_lon - self.min_lon >= 360.0 {
            [(-180.0, 180.0); 2]
        } else if self.min_lon < -180.0 {
            [(-180.0, self.max_lon), (self.min_lon + 360.0, 180.0)]
        } else if self.max_lon > 180.0 {
            [(self.min_lon, 180.0), (-180.0, self.max_lon - 360.0)]
        } else {
            [(self.min_lon, self.max_lon); 2]
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && self
                .longitude_ranges()
                .iter()
                .any(|(min, max)| (*min..=*max).contains(&point.longitude))
    }
}

/// Circular exploration boundary.
///
/// Containment is a planar check on squared degree offsets (longitude scaled
/// to the center's parallel), and the radius is held in that same basis so a
/// fence built from a boundary point contains that point exactly. One degree
/// of latitude is taken as `EARTH_RADIUS_M` meters of arc, the same earth
/// [`GeoPoint::offset`] and [`haversine_distance`] use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    center: GeoPoint,
    radius_deg_sq: f64,
}

impl Geofence {
    pub fn new(center: GeoPoint, radius_meters: f64) -> Result<Self> {
        if !center.is_valid() {
            return Err(CrawlError::InvalidGeofence(format!(
                "invalid center {}",
                center
            )));
        }
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(CrawlError::InvalidGeofence(format!(
                "radius must be positive, got {}",
                radius_meters
            )));
        }

        let radius_deg = meters_to_degrees(radius_meters);
        Ok(Self {
            center,
            radius_deg_sq: radius_deg * radius_deg,
        })
    }

    /// Builds the fence from its center and one point on its boundary.
    pub fn from_reference_points(center: GeoPoint, boundary: GeoPoint) -> Result<Self> {
        if !center.is_valid() || !boundary.is_valid() {
            return Err(CrawlError::InvalidGeofence(format!(
                "invalid reference points {} / {}",
                center, boundary
            )));
        }

        let radius_deg_sq = planar_sq_degrees(center, boundary);
        if radius_deg_sq <= 0.0 {
            return Err(CrawlError::InvalidGeofence(
                "boundary point coincides with the center".to_string(),
            ));
        }

        Ok(Self {
            center,
            radius_deg_sq,
        })
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_deg_sq.sqrt().to_radians() * EARTH_RADIUS_M
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        planar_sq_degrees(self.center, point) <= self.radius_deg_sq
    }
}

fn meters_to_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

fn planar_sq_degrees(center: GeoPoint, point: GeoPoint) -> f64 {
    let dlat = point.latitude - center.latitude;
    let mut dlon = point.longitude - center.longitude;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    let dlon = dlon * center.latitude.to_radians().cos();
    dlat * dlat + dlon * dlon
}

#[cfg(test)]
mod tests {
    use super::*;

    const NANCY: GeoPoint = GeoPoint::new(48.693167, 6.185472);

    #[test]
    fn test_haversine_zero_distance() {
        assert_eq!(haversine_distance(NANCY, NANCY), 0.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let north = GeoPoint::new(1.0, 0.0);
        let d = haversine_distance(GeoPoint::new(0.0, 0.0), north);
        assert!((d - 111_194.9).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_offset_round_trips_through_distance() {
        let moved = NANCY.offset(10.0, 0.0);
        assert!((NANCY.distance_to(&moved) - 10.0).abs() < 1e-6);

        let moved = NANCY.offset(0.0, 100.0);
        assert!((NANCY.distance_to(&moved) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_point() {
        let p: GeoPoint = " 48.693167 , 6.185472 ".parse().unwrap();
        assert_eq!(p, NANCY);
    }

    #[test]
    fn test_parse_point_rejects_garbage() {
        assert!("48.69".parse::<GeoPoint>().is_err());
        assert!("north,east".parse::<GeoPoint>().is_err());
        assert!("91.0,0.0".parse::<GeoPoint>().is_err());
    }

    #[test]
    fn test_display_matches_parse_format() {
        let p = GeoPoint::new(48.5, -6.25);
        assert_eq!(p.to_string(), "48.500000,-6.250000");
    }

    #[test]
    fn test_bounding_box_covers_circle() {
        let bbox = BoundingBox::around(NANCY, 30.0);
        for (north, east) in [(30.0, 0.0), (-30.0, 0.0), (0.0, 30.0), (0.0, -30.0), (21.0, 21.0)] {
            assert!(bbox.contains(NANCY.offset(north, east)));
        }
        assert!(!bbox.contains(NANCY.offset(40.0, 0.0)));
    }

    #[test]
    fn test_bounding_box_splits_at_antimeridian() {
        let east = GeoPoint::new(0.0, 179.9999);
        let bbox = BoundingBox::around(east, 30.0);
        let [(min_a, max_a), (min_b, max_b)] = bbox.longitude_ranges();

        assert_eq!(max_a, 180.0);
        assert_eq!(min_b, -180.0);
        assert!(min_a < 179.9999 && max_b > -179.9999);
        assert!(bbox.contains(GeoPoint::new(0.0, -179.9999)));
        assert!(!bbox.contains(GeoPoint::new(0.0, 0.0)));

        let west = BoundingBox::around(GeoPoint::new(0.0, -179.9999), 30.0);
        assert!(west.contains(east));
    }

    #[test]
    fn test_bounding_box_without_wrap_has_one_range() {
        let bbox = BoundingBox::around(NANCY, 30.0);
        let [a, b] = bbox.longitude_ranges();
        assert_eq!(a, b);
        assert_eq!(a, (bbox.min_lon, bbox.max_lon));
    }

    #[test]
    fn test_geofence_contains_center() {
        let fence = Geofence::new(NANCY, 500.0).unwrap();
        assert!(fence.contains(NANCY));
    }

    #[test]
    fn test_geofence_excludes_just_past_radius() {
        let fence = Geofence::new(NANCY, 500.0).unwrap();

        for (north, east) in [(1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (0.0, -1.0)] {
            let inside = NANCY.offset(499.5 * north, 499.5 * east);
            let outside = NANCY.offset(500.5 * north, 500.5 * east);
            assert!(fence.contains(inside), "{} should be inside", inside);
            assert!(!fence.contains(outside), "{} should be outside", outside);
        }
    }

    #[test]
    fn test_geofence_is_round_east_west() {
        let fence = Geofence::new(NANCY, 500.0).unwrap();
        let east = NANCY.offset(0.0, 400.0);

        assert!(NANCY.distance_to(&east) < 500.0);
        assert!(fence.contains(east));
    }

    #[test]
    fn test_geofence_across_antimeridian() {
        let center = GeoPoint::new(0.0, 179.9990);
        let fence = Geofence::new(center, 500.0).unwrap();

        assert!(fence.contains(GeoPoint::new(0.0, -179.9990)));
        assert!(!fence.contains(GeoPoint::new(0.0, -179.9900)));
    }

    #[test]
    fn test_geofence_from_reference_points() {
        let boundary = GeoPoint::new(48.667770, 6.146822);
        let fence = Geofence::from_reference_points(NANCY, boundary).unwrap();

        assert!(fence.contains(NANCY));
        assert!(fence.contains(boundary));

        let twice = GeoPoint::new(
            NANCY.latitude + 2.0 * (boundary.latitude - NANCY.latitude),
            NANCY.longitude + 2.0 * (boundary.longitude - NANCY.longitude),
        );
        assert!(!fence.contains(twice));
    }

    #[test]
    fn test_geofence_radius_in_meters() {
        let fence = Geofence::new(NANCY, 4_200.0).unwrap();
        assert!((fence.radius_meters() - 4_200.0).abs() < 1e-6);
    }

    #[test]
    fn test_geofence_rejects_non_positive_radius() {
        assert!(Geofence::new(NANCY, 0.0).is_err());
        assert!(Geofence::new(NANCY, -5.0).is_err());
        assert!(Geofence::new(NANCY, f64::NAN).is_err());
        assert!(Geofence::from_reference_points(NANCY, NANCY).is_err());
    }
}
