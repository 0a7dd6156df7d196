//! GeoJSON geometry plus the two measurements the selection path needs:
//! bounding box and area-weighted centroid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounds::{LngLat, LngLatBounds};

/// A GeoJSON position. Extra members (altitude) are carried but ignored.
pub type Position = Vec<f64>;

/// A closed or open linear ring.
pub type Ring = Vec<Position>;

/// Rings below this absolute shoelace area are treated as degenerate.
pub const DEGENERATE_AREA_EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

impl Geometry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("unsupported geometry kind: {0}")]
    UnsupportedGeometry(&'static str),
    #[error("geometry has no finite coordinates")]
    EmptyGeometry,
}

fn finite_point(p: &Position) -> Option<LngLat> {
    let (&lng, &lat) = (p.first()?, p.get(1)?);
    let out = LngLat::new(lng, lat);
    out.is_finite().then_some(out)
}

fn polygon_rings(geometry: &Geometry) -> Result<Vec<&[Ring]>, GeometryError> {
    match geometry {
        Geometry::Polygon { coordinates } => Ok(vec![coordinates.as_slice()]),
        Geometry::MultiPolygon { coordinates } => {
            Ok(coordinates.iter().map(|poly| poly.as_slice()).collect())
        }
        other => Err(GeometryError::UnsupportedGeometry(other.kind_name())),
    }
}

/// Bounds over every ring (outer and holes) of a Polygon or MultiPolygon.
pub fn compute_bounding_box(geometry: &Geometry) -> Result<LngLatBounds, GeometryError> {
    let polygons = polygon_rings(geometry)?;

    let mut bounds: Option<LngLatBounds> = None;
    let points = polygons
        .iter()
        .flat_map(|rings| rings.iter())
        .flat_map(|ring| ring.iter())
        .filter_map(finite_point);
    for p in points {
        match bounds.as_mut() {
            Some(b) => b.extend(p),
            None => bounds = Some(LngLatBounds::from_point(p)),
        }
    }

    bounds.ok_or(GeometryError::EmptyGeometry)
}

/// Signed shoelace area and centroid of a ring.
///
/// Returns `None` for rings with fewer than three finite points or an area
/// below [`DEGENERATE_AREA_EPS`].
fn ring_area_centroid(ring: &[Position]) -> Option<(f64, LngLat)> {
    let pts: Vec<LngLat> = ring.iter().filter_map(finite_point).collect();
    if pts.len() < 3 {
        return None;
    }

    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for (i, a) in pts.iter().enumerate() {
        let b = pts[(i + 1) % pts.len()];
        let cross = a.lng * b.lat - b.lng * a.lat;
        twice_area += cross;
        cx += (a.lng + b.lng) * cross;
        cy += (a.lat + b.lat) * cross;
    }

    let area = twice_area * 0.5;
    if area.abs() < DEGENERATE_AREA_EPS {
        return None;
    }

    let k = 1.0 / (6.0 * area);
    Some((area, LngLat::new(cx * k, cy * k)))
}

fn ring_abs_area(ring: &[Position]) -> f64 {
    ring_area_centroid(ring).map(|(a, _)| a.abs()).unwrap_or(0.0)
}

/// Area-weighted centroid of the outer ring of a Polygon, or of the largest
/// constituent polygon of a MultiPolygon.
///
/// Degenerate rings fall back to the bounding-box midpoint of `geometry`.
pub fn compute_centroid(geometry: &Geometry) -> Result<LngLat, GeometryError> {
    let bounds = compute_bounding_box(geometry)?;
    let polygons = polygon_rings(geometry)?;

    let largest_outer = polygons
        .iter()
        .filter_map(|rings| rings.first())
        .max_by(|a, b| ring_abs_area(a).total_cmp(&ring_abs_area(b)));

    let centroid = largest_outer
        .and_then(|ring| ring_area_centroid(ring))
        .map(|(_, c)| c)
        .filter(LngLat::is_finite);

    Ok(centroid.unwrap_or_else(|| bounds.center()))
}

#[cfg(test)]
mod tests {
    use super::{Geometry, GeometryError, compute_bounding_box, compute_centroid};
    use crate::bounds::LngLat;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Vec<f64>> {
        vec![
            vec![x0, y0],
            vec![x0 + size, y0],
            vec![x0 + size, y0 + size],
            vec![x0, y0 + size],
            vec![x0, y0],
        ]
    }

    #[test]
    fn square_centroid_is_exact_center() {
        let g = Geometry::Polygon {
            coordinates: vec![square(0.0, 0.0, 2.0)],
        };
        let c = compute_centroid(&g).unwrap();
        assert_close(c.lng, 1.0, 1e-12);
        assert_close(c.lat, 1.0, 1e-12);
    }

    #[test]
    fn centroid_ignores_winding_direction() {
        let mut ring = square(10.0, 20.0, 4.0);
        ring.reverse();
        let g = Geometry::Polygon {
            coordinates: vec![ring],
        };
        let c = compute_centroid(&g).unwrap();
        assert_close(c.lng, 12.0, 1e-9);
        assert_close(c.lat, 22.0, 1e-9);
    }

    #[test]
    fn degenerate_ring_falls_back_to_bbox_midpoint() {
        let g = Geometry::Polygon {
            coordinates: vec![vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![4.0, 4.0]]],
        };
        let c = compute_centroid(&g).unwrap();
        assert_eq!(c, LngLat::new(2.0, 2.0));
    }

    #[test]
    fn two_point_ring_falls_back_to_bbox_midpoint() {
        let g = Geometry::Polygon {
            coordinates: vec![vec![vec![-2.0, 0.0], vec![2.0, 6.0]]],
        };
        assert_eq!(compute_centroid(&g).unwrap(), LngLat::new(0.0, 3.0));
    }

    #[test]
    fn multipolygon_uses_largest_outer_ring() {
        let g = Geometry::MultiPolygon {
            coordinates: vec![
                vec![square(100.0, 0.0, 1.0)],
                vec![square(0.0, 0.0, 10.0)],
                vec![square(-50.0, -50.0, 2.0)],
            ],
        };
        let c = compute_centroid(&g).unwrap();
        assert_close(c.lng, 5.0, 1e-9);
        assert_close(c.lat, 5.0, 1e-9);

        let b = compute_bounding_box(&g).unwrap();
        assert_eq!(b.to_array(), [-50.0, -50.0, 101.0, 10.0]);
    }

    #[test]
    fn holes_count_toward_bounds_but_not_centroid() {
        let g = Geometry::Polygon {
            coordinates: vec![square(0.0, 0.0, 4.0), square(1.0, 1.0, 1.0)],
        };
        let c = compute_centroid(&g).unwrap();
        assert_close(c.lng, 2.0, 1e-9);
        assert_close(c.lat, 2.0, 1e-9);
    }

    #[test]
    fn non_finite_coordinates_are_skipped() {
        let g = Geometry::Polygon {
            coordinates: vec![vec![
                vec![f64::NAN, 0.0],
                vec![1.0, 1.0],
                vec![3.0, f64::INFINITY],
                vec![5.0, 2.0],
            ]],
        };
        let b = compute_bounding_box(&g).unwrap();
        assert_eq!(b.to_array(), [1.0, 1.0, 5.0, 2.0]);
    }

    #[test]
    fn rejects_unsupported_and_empty_geometry() {
        let point = Geometry::Point {
            coordinates: vec![1.0, 2.0],
        };
        assert_eq!(
            compute_bounding_box(&point),
            Err(GeometryError::UnsupportedGeometry("Point"))
        );
        assert_eq!(
            compute_centroid(&point),
            Err(GeometryError::UnsupportedGeometry("Point"))
        );

        let empty = Geometry::MultiPolygon {
            coordinates: vec![vec![vec![vec![f64::NAN, f64::NAN]]]],
        };
        assert_eq!(compute_bounding_box(&empty), Err(GeometryError::EmptyGeometry));
    }

    #[test]
    fn deserializes_geojson() {
        let g: Geometry = serde_json::from_str(
            r#"{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#,
        )
        .unwrap();
        assert_eq!(g.kind_name(), "Polygon");
        assert_eq!(compute_bounding_box(&g).unwrap().to_array(), [0.0, 0.0, 2.0, 2.0]);
    }
}
