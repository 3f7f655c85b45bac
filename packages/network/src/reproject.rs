//! Coordinate transforms between the supported CRSs and metric lengths.
//!
//! Only geographic WGS84 and spherical web mercator are supported, so the
//! transform is analytic and needs no projection database.

use geo::{Coord, Distance, Euclidean, Haversine, Length, LineString, MapCoords, Point};
use netrisk_network_models::Crs;

/// Sphere radius used by web mercator.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude beyond which web mercator is undefined.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

fn to_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    Coord {
        x: MERCATOR_RADIUS * c.x.to_radians(),
        y: MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

fn from_mercator(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / MERCATOR_RADIUS).to_degrees(),
        y: (2.0 * (c.y / MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
            .to_degrees(),
    }
}

/// Transforms a single coordinate from one CRS to another.
#[must_use]
pub fn reproject_coord(c: Coord<f64>, from: Crs, to: Crs) -> Coord<f64> {
    match (from, to) {
        (Crs::Wgs84, Crs::WebMercator) => to_mercator(c),
        (Crs::WebMercator, Crs::Wgs84) => from_mercator(c),
        (Crs::Wgs84, Crs::Wgs84) | (Crs::WebMercator, Crs::WebMercator) => c,
    }
}

#[must_use]
pub fn reproject_line(line: &LineString<f64>, from: Crs, to: Crs) -> LineString<f64> {
    if from == to {
        return line.clone();
    }
    line.map_coords(|c| reproject_coord(c, from, to))
}

#[must_use]
pub fn reproject_point(point: Point<f64>, from: Crs, to: Crs) -> Point<f64> {
    Point(reproject_coord(point.0, from, to))
}

/// Length of a line in metres. Geographic lines use great-circle distance.
#[must_use]
pub fn line_length(line: &LineString<f64>, crs: Crs) -> f64 {
    if crs.is_geographic() {
        Haversine.length(line)
    } else {
        Euclidean.length(line)
    }
}

/// Distance between two points in metres.
#[must_use]
pub fn point_distance(a: Point<f64>, b: Point<f64>, crs: Crs) -> f64 {
    if crs.is_geographic() {
        Haversine.distance(a, b)
    } else {
        Euclidean.distance(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_round_trip_is_stable() {
        let c = Coord { x: 4.9, y: 52.37 };
        let back = reproject_coord(
            reproject_coord(c, Crs::Wgs84, Crs::WebMercator),
            Crs::WebMercator,
            Crs::Wgs84,
        );
        assert!((back.x - c.x).abs() < 1e-9);
        assert!((back.y - c.y).abs() < 1e-9);
    }

    #[test]
    fn mercator_origin_and_antimeridian() {
        let origin = reproject_coord(Coord { x: 0.0, y: 0.0 }, Crs::Wgs84, Crs::WebMercator);
        assert!(origin.x.abs() < 1e-9);
        assert!(origin.y.abs() < 1e-9);

        let east = reproject_coord(Coord { x: 180.0, y: 0.0 }, Crs::Wgs84, Crs::WebMercator);
        assert!((east.x - 20_037_508.342_789_244).abs() < 1e-6);
    }

    #[test]
    fn projected_length_is_euclidean() {
        let line = LineString::from(vec![(0.0, 0.0), (3.0, 4.0), (3.0, 10.0)]);
        assert!((line_length(&line, Crs::WebMercator) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn geographic_length_is_in_metres() {
        let line = LineString::from(vec![(0.0, 0.0), (0.0, 1.0)]);
        let len = line_length(&line, Crs::Wgs84);
        assert!((len - 111_195.0).abs() < 100.0, "{len}");
    }
}
