use geo::{Area, ConvexHull, Coord, Intersects, Line, LineString, MultiPoint};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

pub mod alpha;
pub mod delaunay;

/// Tolerance used for degenerate-area checks, in pixels squared.
pub const EPSILON: f64 = 1e-9;

/// Image-plane point as persisted in ROI documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub(crate) fn key(self) -> (u64, u64) {
        // -0.0 and 0.0 must collapse to the same key
        let x = if self.x == 0.0 { 0.0 } else { self.x };
        let y = if self.y == 0.0 { 0.0 } else { self.y };
        (x.to_bits(), y.to_bits())
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for Coord<f64> {
    fn from(point: Point) -> Self {
        Coord {
            x: point.x,
            y: point.y,
        }
    }
}

impl From<Coord<f64>> for Point {
    fn from(coord: Coord<f64>) -> Self {
        Self {
            x: coord.x,
            y: coord.y,
        }
    }
}

/// A computed region. `area` is carried separately because alpha-shape
/// regions may contain holes, in which case it is smaller than the area
/// enclosed by `outline`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub outline: geo::Polygon<f64>,
    pub area: f64,
}

impl Polygon {
    pub fn from_ring(ring: &[Point], area: f64) -> Self {
        Self {
            outline: ring_polygon(ring),
            area,
        }
    }

    /// Outer ring without the closing vertex.
    pub fn exterior(&self) -> Vec<Point> {
        let coords = &self.outline.exterior().0;
        let open = match (coords.first(), coords.last()) {
            (Some(first), Some(last)) if coords.len() > 1 && first == last => {
                &coords[..coords.len() - 1]
            }
            _ => &coords[..],
        };
        open.iter().copied().map(Point::from).collect()
    }

    /// Points on the boundary count as contained.
    pub fn contains(&self, point: Point) -> bool {
        self.outline.intersects(&Coord::from(point))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoShapeReason {
    TooFewPoints,
    Collinear,
    /// A shape parameter left no triangle, or left points uncovered.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Region(Polygon),
    NoShape(NoShapeReason),
}

impl Shape {
    pub fn region(&self) -> Option<&Polygon> {
        match self {
            Shape::Region(polygon) => Some(polygon),
            Shape::NoShape(_) => None,
        }
    }

    pub fn area(&self) -> f64 {
        self.region().map(|polygon| polygon.area).unwrap_or(0.0)
    }
}

/// Twice the signed area of triangle (a, b, c); positive when counter-clockwise.
pub fn cross(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn ring_polygon(ring: &[Point]) -> geo::Polygon<f64> {
    let coords: Vec<Coord<f64>> = ring.iter().copied().map(Coord::from).collect();
    geo::Polygon::new(LineString::from(coords), Vec::new())
}

/// Signed area of an open ring; positive when counter-clockwise.
pub fn signed_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    ring_polygon(ring).signed_area()
}

/// Area of an ordered vertex list. Returns 0 for fewer than three vertices
/// and for self-intersecting rings.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 || is_self_intersecting(vertices) {
        return 0.0;
    }
    ring_polygon(vertices).unsigned_area()
}

pub fn is_self_intersecting(ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }
    let edges: Vec<Line<f64>> = (0..n)
        .map(|i| Line::new(Coord::from(ring[i]), Coord::from(ring[(i + 1) % n])))
        .collect();
    for i in 0..n {
        for j in (i + 1)..n {
            // adjacent edges share a vertex by construction
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if edges[i].intersects(&edges[j]) {
                return true;
            }
        }
    }
    false
}

/// Point-in-polygon test. Points on the boundary count as contained.
pub fn contains(ring: &[Point], point: Point) -> bool {
    ring.len() >= 3 && ring_polygon(ring).intersects(&Coord::from(point))
}

/// Removes exactly coincident points, keeping the first occurrence.
pub fn dedup_points(points: &[Point]) -> Vec<Point> {
    let mut seen = HashSet::with_capacity(points.len());
    points
        .iter()
        .copied()
        .filter(|point| seen.insert(point.key()))
        .collect()
}

pub fn convex_hull(points: &[Point]) -> Shape {
    let unique = dedup_points(points);
    if unique.len() < 3 {
        return Shape::NoShape(NoShapeReason::TooFewPoints);
    }
    let cloud: MultiPoint<f64> = unique.into_iter().map(Coord::from).collect();
    let outline = cloud.convex_hull();
    let area = outline.unsigned_area();
    if area <= EPSILON {
        return Shape::NoShape(NoShapeReason::Collinear);
    }
    Shape::Region(Polygon { outline, area })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(10.0, 10.0),
            Point::new(110.0, 10.0),
            Point::new(110.0, 110.0),
            Point::new(10.0, 110.0),
        ]
    }

    #[test]
    fn polygon_area_of_square() {
        assert_eq!(polygon_area(&square()), 10_000.0);
    }

    #[test]
    fn polygon_area_is_orientation_independent() {
        let mut reversed = square();
        reversed.reverse();
        assert_eq!(polygon_area(&reversed), 10_000.0);
        assert_eq!(signed_area(&reversed), -10_000.0);
    }

    #[test]
    fn bowtie_area_is_zero() {
        let bowtie = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ];
        assert!(is_self_intersecting(&bowtie));
        assert_eq!(polygon_area(&bowtie), 0.0);
    }

    #[test]
    fn too_few_vertices_area_is_zero() {
        assert_eq!(polygon_area(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn contains_interior_and_boundary() {
        let ring = square();
        assert!(contains(&ring, Point::new(80.0, 80.0)));
        assert!(contains(&ring, Point::new(10.0, 50.0)));
        assert!(!contains(&ring, Point::new(500.0, 500.0)));
        assert!(!contains(&ring, Point::new(5.0, 50.0)));
    }

    #[test]
    fn convex_hull_drops_interior_points() {
        let mut points = square();
        points.push(Point::new(50.0, 50.0));

        let shape = convex_hull(&points);

        let polygon = shape.region().expect("hull");
        assert!((polygon.area - 10_000.0).abs() < 1e-9);
        assert!(!polygon.exterior().contains(&Point::new(50.0, 50.0)));
        assert!(polygon.contains(Point::new(50.0, 50.0)));
    }

    #[test]
    fn exterior_is_open_ring() {
        let polygon = Polygon::from_ring(&square(), 10_000.0);
        assert_eq!(polygon.exterior(), square());
    }

    #[test]
    fn convex_hull_of_collinear_points_is_no_shape() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ];
        assert_eq!(convex_hull(&points), Shape::NoShape(NoShapeReason::Collinear));
    }

    #[test]
    fn convex_hull_of_duplicates_is_too_few_points() {
        let points = vec![Point::new(1.0, 1.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        assert_eq!(
            convex_hull(&points),
            Shape::NoShape(NoShapeReason::TooFewPoints)
        );
    }

    #[test]
    fn dedup_treats_negative_zero_as_zero() {
        let points = vec![Point::new(0.0, 1.0), Point::new(-0.0, 1.0)];
        assert_eq!(dedup_points(&points).len(), 1);
    }
}
