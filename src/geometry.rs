//! Pure geometric primitives: point-in-polygon and distance.
//!
//! Polygons are treated as planar in (lat, lon) space, which is acceptable
//! for the sub-kilometre building footprints this engine works with.

use crate::types::Coord;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in metres.
pub fn haversine_distance(a: Coord, b: Coord) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Appends the first vertex to close the ring if it is not already closed.
/// `geometry`'s other functions assume a closed polygon; this is the one
/// place that precondition is established.
pub fn close_polygon(mut polygon: Vec<Coord>) -> Vec<Coord> {
    match (polygon.first(), polygon.last()) {
        (Some(first), Some(last)) if first != last => {
            let first = *first;
            polygon.push(first);
            polygon
        }
        _ => polygon,
    }
}

/// Even-odd ray-casting point-in-polygon test. `polygon` must be closed
/// (first == last); pass footprints through [`close_polygon`] first.
pub fn point_in_polygon(point: Coord, polygon: &[Coord]) -> bool {
    if polygon.len() < 4 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        let intersects = (pi.lat > point.lat) != (pj.lat > point.lat)
            && point.lon
                < (pj.lon - pi.lon) * (point.lat - pi.lat) / (pj.lat - pi.lat) + pi.lon;
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Minimum distance from `point` to the nearest edge of `polygon`, in
/// metres.
fn distance_to_polygon_edge(point: Coord, polygon: &[Coord]) -> f64 {
    let mut best = f64::INFINITY;
    for window in polygon.windows(2) {
        let d = distance_to_segment(point, window[0], window[1]);
        if d < best {
            best = d;
        }
    }
    best
}

/// Distance from `point` to the segment `a`–`b`, approximating locally with
/// an equirectangular projection scaled by latitude (adequate at
/// sub-kilometre scale) and falling back to haversine for the projected
/// nearest point.
fn distance_to_segment(point: Coord, a: Coord, b: Coord) -> f64 {
    let lat_scale = point.lat.to_radians().cos().max(1e-6);
    let to_xy = |c: Coord| -> (f64, f64) {
        (
            (c.lon - point.lon) * lat_scale,
            c.lat - point.lat,
        )
    };
    let (ax, ay) = to_xy(a);
    let (bx, by) = to_xy(b);
    let (px, py) = (0.0, 0.0);

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let (nearest_lat, nearest_lon) = if len_sq < 1e-18 {
        (a.lat, a.lon)
    } else {
        let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
        let nx = ax + t * dx;
        let ny = ay + t * dy;
        (point.lat + ny, point.lon + nx / lat_scale)
    };

    haversine_distance(point, Coord { lat: nearest_lat, lon: nearest_lon })
}

/// Distance in metres from `point` to the nearest edge among all
/// `footprints`' polygons. Returns `f64::INFINITY` if `footprints` is empty.
pub fn nearest_polygon_distance(point: Coord, footprints: &[crate::types::Footprint]) -> f64 {
    footprints
        .iter()
        .map(|f| distance_to_polygon_edge(point, &f.polygon))
        .fold(f64::INFINITY, f64::min)
}
