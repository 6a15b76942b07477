use crate::geometry::{EPSILON, Point, cross};
use geo::{Coord, LineString, TriangulateDelaunay};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Triangulation {
    pub points: Vec<Point>,
    /// Counter-clockwise vertex indices into `points`.
    pub triangles: Vec<[usize; 3]>,
}

/// Circumcenter and circumradius, or `None` for a degenerate triangle.
pub fn circumcircle(a: Point, b: Point, c: Point) -> Option<(Point, f64)> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() <= EPSILON {
        return None;
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let center = Point::new(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    );
    Some((center, (center.x - a.x).hypot(center.y - a.y)))
}

/// Delaunay triangulation of distinct points, as indices into the input.
/// The triangle list is empty when the input cannot enclose any area.
pub fn triangulate(points: &[Point]) -> Triangulation {
    let mut triangulation = Triangulation {
        points: points.to_vec(),
        triangles: Vec::new(),
    };
    if points.len() < 3 {
        return triangulation;
    }

    let slots: HashMap<(u64, u64), usize> = points
        .iter()
        .enumerate()
        .map(|(slot, point)| (point.key(), slot))
        .collect();
    let cloud: LineString<f64> = points.iter().copied().map(Coord::from).collect();
    let triangles = match cloud.unconstrained_triangulation() {
        Ok(triangles) => triangles,
        Err(err) => {
            debug!(error = ?err, points = points.len(), "Triangulation rejected input");
            return triangulation;
        }
    };

    triangulation.triangles = triangles
        .iter()
        .filter_map(|triangle| {
            let [a, b, c] = triangle
                .to_array()
                .map(|coord| slots.get(&Point::from(coord).key()).copied());
            let (a, b, c) = (a?, b?, c?);
            let twice_area = cross(points[a], points[b], points[c]);
            if twice_area > EPSILON {
                Some([a, b, c])
            } else if twice_area < -EPSILON {
                Some([a, c, b])
            } else {
                None
            }
        })
        .collect();
    triangulation
}

pub fn edges([a, b, c]: [usize; 3]) -> [(usize, usize); 3] {
    [(a, b), (b, c), (c, a)]
}

pub fn undirected(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}
