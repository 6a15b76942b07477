use crate::geometry::delaunay::{self, Triangulation, circumcircle, edges, undirected};
use crate::geometry::{
    EPSILON, NoShapeReason, Point, Polygon, Shape, cross, dedup_points, signed_area,
};
use std::collections::HashMap;
use std::f64::consts::TAU;

/// Relative slack when comparing circumradii against a radius limit.
const RADIUS_SLACK: f64 = 1e-9;

/// Delaunay triangles with their circumradii. A parameter `alpha` keeps the
/// triangles whose circumradius is at most `1 / alpha`, and `alpha == 0`
/// keeps all of them, which tiles the convex hull. The region is the largest
/// edge-connected group of kept triangles.
#[derive(Debug, Clone)]
pub struct AlphaComplex {
    triangulation: Triangulation,
    radii: Vec<f64>,
    /// Distinct circumradii, ascending.
    thresholds: Vec<f64>,
}

struct Component {
    triangles: Vec<usize>,
    area: f64,
    vertex_count: usize,
}

impl AlphaComplex {
    pub fn build(points: &[Point]) -> Result<Self, NoShapeReason> {
        let unique = dedup_points(points);
        if unique.len() < 3 {
            return Err(NoShapeReason::TooFewPoints);
        }
        let triangulation = delaunay::triangulate(&unique);
        if triangulation.triangles.is_empty() {
            return Err(NoShapeReason::Collinear);
        }

        let radii: Vec<f64> = triangulation
            .triangles
            .iter()
            .map(|&[a, b, c]| {
                let points = &triangulation.points;
                circumcircle(points[a], points[b], points[c])
                    .map(|(_, radius)| radius)
                    .unwrap_or(f64::INFINITY)
            })
            .collect();

        let mut thresholds = radii.clone();
        thresholds.sort_by(f64::total_cmp);
        thresholds.dedup();

        Ok(Self {
            triangulation,
            radii,
            thresholds,
        })
    }

    pub fn point_count(&self) -> usize {
        self.triangulation.points.len()
    }

    /// Shape for a given parameter.
    pub fn shape(&self, alpha: f64) -> Shape {
        let limit = radius_limit(alpha);
        match self.largest_component(limit) {
            Some(component) => self.polygon(&component),
            None => Shape::NoShape(NoShapeReason::Empty),
        }
    }

    /// The largest parameter whose shape is a single region touching every
    /// point. Binary search over circumradii, where covering is monotone.
    pub fn optimal_alpha(&self) -> Option<f64> {
        let total = self.point_count();
        let index = first_satisfying(&self.thresholds, |limit| {
            self.largest_component(limit)
                .is_some_and(|component| component.vertex_count == total)
        })?;
        Some(alpha_for_limit(self.thresholds[index]))
    }

    /// Starting from `alpha`, keeps more triangles until the region's area
    /// reaches `min_area`. Returns the relaxed parameter and its region, or
    /// `None` when even the full triangulation stays below `min_area`.
    pub fn relax_to_area(&self, alpha: f64, min_area: f64) -> Option<(f64, Polygon)> {
        let start = radius_limit(alpha);
        let candidates: Vec<f64> = self
            .thresholds
            .iter()
            .copied()
            .filter(|&limit| limit >= start)
            .collect();
        let area_at = |limit: f64| {
            self.largest_component(limit)
                .map(|component| component.area)
                .unwrap_or(0.0)
        };

        if area_at(start) >= min_area {
            return self.region_at(start).map(|polygon| (alpha, polygon));
        }
        let index = first_satisfying(&candidates, |limit| area_at(limit) >= min_area)?;
        let limit = candidates[index];
        self.region_at(limit)
            .map(|polygon| (alpha_for_limit(limit), polygon))
    }

    fn region_at(&self, limit: f64) -> Option<Polygon> {
        let component = self.largest_component(limit)?;
        match self.polygon(&component) {
            Shape::Region(polygon) => Some(polygon),
            Shape::NoShape(_) => None,
        }
    }

    fn largest_component(&self, limit: f64) -> Option<Component> {
        let kept: Vec<usize> = (0..self.radii.len())
            .filter(|&index| self.radii[index] <= limit * (1.0 + RADIUS_SLACK))
            .collect();
        if kept.is_empty() {
            return None;
        }

        let mut parent: Vec<usize> = (0..kept.len()).collect();
        let mut owner: HashMap<(usize, usize), usize> = HashMap::new();
        for (slot, &triangle) in kept.iter().enumerate() {
            for (from, to) in edges(self.triangulation.triangles[triangle]) {
                if let Some(&other) = owner.get(&undirected(from, to)) {
                    union(&mut parent, slot, other);
                } else {
                    owner.insert(undirected(from, to), slot);
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for slot in 0..kept.len() {
            let root = find(&mut parent, slot);
            groups.entry(root).or_default().push(kept[slot]);
        }

        groups
            .into_values()
            .map(|triangles| {
                let points = &self.triangulation.points;
                let mut vertices: Vec<usize> = triangles
                    .iter()
                    .flat_map(|&index| self.triangulation.triangles[index])
                    .collect();
                vertices.sort_unstable();
                vertices.dedup();
                let area = triangles
                    .iter()
                    .map(|&index| {
                        let [a, b, c] = self.triangulation.triangles[index];
                        cross(points[a], points[b], points[c]) / 2.0
                    })
                    .sum();
                Component {
                    triangles,
                    area,
                    vertex_count: vertices.len(),
                }
            })
            .max_by(|left, right| left.area.total_cmp(&right.area))
    }

    fn polygon(&self, component: &Component) -> Shape {
        let points = &self.triangulation.points;
        let mut edge_count: HashMap<(usize, usize), u32> = HashMap::new();
        for &index in &component.triangles {
            for (from, to) in edges(self.triangulation.triangles[index]) {
                *edge_count.entry(undirected(from, to)).or_insert(0) += 1;
            }
        }
        let boundary: Vec<(usize, usize)> = component
            .triangles
            .iter()
            .flat_map(|&index| edges(self.triangulation.triangles[index]))
            .filter(|&(from, to)| edge_count.get(&undirected(from, to)) == Some(&1))
            .collect();

        let outer = trace_rings(points, &boundary)
            .into_iter()
            .map(|ring| simplify(&ring))
            .filter(|ring| ring.len() >= 3)
            .max_by(|left, right| signed_area(left).total_cmp(&signed_area(right)));

        match outer {
            Some(exterior) if component.area > EPSILON => {
                Shape::Region(Polygon::from_ring(&exterior, component.area))
            }
            _ => Shape::NoShape(NoShapeReason::Empty),
        }
    }
}

/// Builds the shape of `points` for a fixed parameter.
pub fn alpha_shape(points: &[Point], alpha: f64) -> Shape {
    match AlphaComplex::build(points) {
        Ok(complex) => complex.shape(alpha),
        Err(reason) => Shape::NoShape(reason),
    }
}

/// Searches the tightest parameter that still covers every point with one
/// region. `None` when the points cannot enclose any area.
pub fn optimize_alpha(points: &[Point]) -> Option<f64> {
    AlphaComplex::build(points).ok()?.optimal_alpha()
}

fn radius_limit(alpha: f64) -> f64 {
    if alpha <= 0.0 || !alpha.is_finite() {
        f64::INFINITY
    } else {
        1.0 / alpha
    }
}

fn alpha_for_limit(limit: f64) -> f64 {
    if limit.is_finite() && limit > 0.0 {
        1.0 / limit
    } else {
        0.0
    }
}

/// Index of the first element satisfying a monotone predicate.
fn first_satisfying(values: &[f64], predicate: impl Fn(f64) -> bool) -> Option<usize> {
    let (mut low, mut high) = (0usize, values.len());
    while low < high {
        let mid = low + (high - low) / 2;
        if predicate(values[mid]) {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    (low < values.len()).then_some(low)
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (root_a, root_b) = (find(parent, a), find(parent, b));
    if root_a != root_b {
        parent[root_a] = root_b;
    }
}

/// Chains directed boundary edges into closed rings. At a pinch vertex the
/// next edge is the first one clockwise from the incoming edge, which keeps
/// each ring on a single face.
fn trace_rings(points: &[Point], boundary: &[(usize, usize)]) -> Vec<Vec<Point>> {
    let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
    for (slot, &(from, _)) in boundary.iter().enumerate() {
        outgoing.entry(from).or_default().push(slot);
    }

    let mut used = vec![false; boundary.len()];
    let mut rings = Vec::new();
    for start in 0..boundary.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut ring = vec![points[boundary[start].0]];
        let (mut previous, mut current) = boundary[start];

        while current != boundary[start].0 {
            ring.push(points[current]);
            let back = angle(points[current], points[previous]);
            let next = outgoing.get(&current).and_then(|slots| {
                slots
                    .iter()
                    .copied()
                    .filter(|&slot| !used[slot])
                    .min_by(|&left, &right| {
                        let turn = |slot: usize| {
                            let heading = angle(points[current], points[boundary[slot].1]);
                            (back - heading).rem_euclid(TAU)
                        };
                        turn(left).total_cmp(&turn(right))
                    })
            });
            let Some(slot) = next else {
                break;
            };
            used[slot] = true;
            previous = current;
            current = boundary[slot].1;
        }
        rings.push(ring);
    }
    rings
}

fn angle(from: Point, to: Point) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// Drops vertices that lie on the straight line between their neighbours.
fn simplify(ring: &[Point]) -> Vec<Point> {
    let n = ring.len();
    if n < 3 {
        return ring.to_vec();
    }
    (0..n)
        .filter(|&index| {
            let previous = ring[(index + n - 1) % n];
            let next = ring[(index + 1) % n];
            cross(previous, ring[index], next).abs() > EPSILON
        })
        .map(|index| ring[index])
        .collect()
}
