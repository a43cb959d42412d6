use std::ops::{Add, Mul, Sub};

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use serde::{Deserialize, Serialize};

/// Tolerance for orientation and degeneracy checks.
pub const EPSILON: f64 = 1e-9;
/// Simplification tolerance applied to merged obstacles (world units).
pub const SIMPLIFY_TOLERANCE: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self - other).length()
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn normalized(self) -> Option<Point> {
        let len = self.length();
        if len <= EPSILON || !len.is_finite() {
            return None;
        }
        Some(Point::new(self.x / len, self.y / len))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}

impl From<Point> for (f64, f64) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Simple polygon given by its vertices in order; the ring is implicitly closed.
pub type Polygon = Vec<Point>;

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn edges(polygon: &[Point]) -> impl Iterator<Item = (Point, Point)> + '_ {
    let n = polygon.len();
    (0..n).map(move |i| (polygon[i], polygon[(i + 1) % n]))
}

/// For every vertex, a point `distance` units outward along the corner bisector.
///
/// Vertices whose adjacent edges have zero length, or whose neighbours are
/// collinear with them, have no usable bisector and are skipped.
pub fn offset_corners(polygon: &[Point], distance: f64) -> Vec<Point> {
    let n = polygon.len();
    if n < 3 {
        return Vec::new();
    }

    let mut points = Vec::with_capacity(n);
    for i in 0..n {
        let corner = polygon[i];
        let previous = polygon[(i + n - 1) % n];
        let next = polygon[(i + 1) % n];

        let (Some(to_previous), Some(to_next)) =
            ((previous - corner).normalized(), (next - corner).normalized())
        else {
            continue;
        };
        let Some(bisector) = (to_previous + to_next).normalized() else {
            continue;
        };

        let point = corner - bisector * distance;
        if point.is_finite() {
            points.push(point);
        }
    }
    points
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Segment intersection test that counts touching endpoints and collinear overlap.
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    let straddles = |a: f64, b: f64| (a > EPSILON && b < -EPSILON) || (a < -EPSILON && b > EPSILON);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    (d1.abs() <= EPSILON && on_segment(q1, q2, p1))
        || (d2.abs() <= EPSILON && on_segment(q1, q2, p2))
        || (d3.abs() <= EPSILON && on_segment(p1, p2, q1))
        || (d4.abs() <= EPSILON && on_segment(p1, p2, q2))
}

/// Even-odd ray cast. Points exactly on the boundary may land either way.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = polygon[i];
        let pj = polygon[j];
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

pub fn distance_to_segment(point: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq <= EPSILON {
        return point.distance(a);
    }
    let ap = point - a;
    let t = ((ap.x * ab.x + ap.y * ab.y) / len_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

pub fn distance_to_boundary(point: Point, polygon: &[Point]) -> f64 {
    match polygon.len() {
        0 => f64::INFINITY,
        1 => point.distance(polygon[0]),
        _ => edges(polygon)
            .map(|(a, b)| distance_to_segment(point, a, b))
            .fold(f64::INFINITY, f64::min),
    }
}

pub fn distance_to_polygon(polygon: &[Point], point: Point) -> f64 {
    if point_in_polygon(point, polygon) {
        0.0
    } else {
        distance_to_boundary(point, polygon)
    }
}

pub fn disk_intersects_polygon(center: Point, radius: f64, polygon: &[Point]) -> bool {
    distance_to_polygon(polygon, center) <= radius
}

/// True if the segment `a -> b` touches the boundary of or lies inside `polygon`.
pub fn segment_crosses_polygon(a: Point, b: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    if edges(polygon).any(|(p, q)| segments_intersect(a, b, p, q)) {
        return true;
    }
    point_in_polygon(a, polygon)
}

pub fn signed_area(polygon: &[Point]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    edges(polygon)
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum::<f64>()
        / 2.0
}

pub fn polygon_area(polygon: &[Point]) -> f64 {
    signed_area(polygon).abs()
}

/// Area centroid; falls back to the vertex mean for degenerate rings.
pub fn centroid(polygon: &[Point]) -> Point {
    if polygon.is_empty() {
        return Point::default();
    }
    let area = signed_area(polygon);
    if area.abs() <= EPSILON {
        let n = polygon.len() as f64;
        let sum = polygon.iter().fold(Point::default(), |acc, p| acc + *p);
        return Point::new(sum.x / n, sum.y / n);
    }

    let (cx, cy) = edges(polygon).fold((0.0, 0.0), |(cx, cy), (a, b)| {
        let f = a.x * b.y - b.x * a.y;
        (cx + (a.x + b.x) * f, cy + (a.y + b.y) * f)
    });
    Point::new(cx / (6.0 * area), cy / (6.0 * area))
}

fn covers(outer: &[Point], point: Point, tolerance: f64) -> bool {
    point_in_polygon(point, outer) || distance_to_boundary(point, outer) <= tolerance
}

/// True if every vertex and edge midpoint of `inner` lies inside `outer` or
/// within `tolerance` of its boundary.
pub fn polygon_contains(outer: &[Point], inner: &[Point], tolerance: f64) -> bool {
    if outer.len() < 3 || inner.is_empty() {
        return false;
    }
    if !inner.iter().all(|p| covers(outer, *p, tolerance)) {
        return false;
    }
    edges(inner).all(|(a, b)| covers(outer, (a + b) * 0.5, tolerance))
}

fn to_path(polygon: &[Point]) -> Vec<[f64; 2]> {
    polygon.iter().map(|p| [p.x, p.y]).collect()
}

fn from_path(path: Vec<[f64; 2]>) -> Polygon {
    path.into_iter().map(|[x, y]| Point::new(x, y)).collect()
}

/// Outer contours of `p ∪ q`, one per disjoint component. Holes are dropped.
pub fn union_outlines(p: &[Point], q: &[Point]) -> Vec<Polygon> {
    let subject: Vec<Vec<[f64; 2]>> = vec![to_path(p)];
    let clip: Vec<[f64; 2]> = to_path(q);
    let shapes = subject.overlay(&[clip], OverlayRule::Union, FillRule::NonZero);

    shapes
        .into_iter()
        .filter_map(|shape| shape.into_iter().next())
        .filter(|contour| contour.len() >= 3)
        .map(from_path)
        .collect()
}

/// True unless the union of `p` and `q` falls apart into separate components.
/// A shared corner alone leaves two components.
pub fn polygons_overlap(p: &[Point], q: &[Point]) -> bool {
    if p.len() < 3 || q.len() < 3 {
        return false;
    }
    union_outlines(p, q).len() == 1
}

/// Union of two overlapping obstacles, simplified.
///
/// With `clamp_to_quad`, a five-vertex result loses its least significant
/// vertex so merged obstacles stay quadrilateral-bounded.
pub fn merge_polygons(p: &[Point], q: &[Point], clamp_to_quad: bool) -> Polygon {
    let merged = union_outlines(p, q)
        .into_iter()
        .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)));

    let Some(merged) = merged else {
        return if polygon_area(p) >= polygon_area(q) {
            p.to_vec()
        } else {
            q.to_vec()
        };
    };

    let mut simplified = simplify(&merged, SIMPLIFY_TOLERANCE);
    if clamp_to_quad && simplified.len() == 5 {
        drop_least_significant(&mut simplified);
    }
    simplified
}

/// Removes duplicate vertices and vertices closer than `tolerance` to the line
/// through their neighbours, never going below three vertices.
pub fn simplify(polygon: &[Point], tolerance: f64) -> Polygon {
    let mut ring: Polygon = Vec::with_capacity(polygon.len());
    for p in polygon {
        if ring.last().is_none_or(|last: &Point| last.distance(*p) > EPSILON) {
            ring.push(*p);
        }
    }
    while ring.len() > 1 && ring[0].distance(ring[ring.len() - 1]) <= EPSILON {
        ring.pop();
    }

    while ring.len() > 3 {
        let n = ring.len();
        let flattest = (0..n)
            .map(|i| {
                let deviation =
                    distance_to_segment(ring[i], ring[(i + n - 1) % n], ring[(i + 1) % n]);
                (i, deviation)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match flattest {
            Some((idx, deviation)) if deviation < tolerance => {
                ring.remove(idx);
            }
            _ => break,
        }
    }
    ring
}

/// Drops the vertex spanning the smallest triangle with its neighbours.
pub fn drop_least_significant(polygon: &mut Polygon) {
    let n = polygon.len();
    if n <= 3 {
        return;
    }
    let weakest = (0..n)
        .map(|i| {
            let area = cross(polygon[(i + n - 1) % n], polygon[i], polygon[(i + 1) % n]).abs();
            (i, area)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i);
    if let Some(idx) = weakest {
        polygon.remove(idx);
    }
}

pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon {
    vec![
        Point::new(min_x, min_y),
        Point::new(max_x, min_y),
        Point::new(max_x, max_y),
        Point::new(min_x, max_y),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Polygon {
        rectangle(x, y, x + side, y + side)
    }

    #[test]
    fn offset_corners_move_outward() {
        let sq = square(0.0, 0.0, 10.0);
        let offsets = offset_corners(&sq, 10.0);

        assert_eq!(offsets.len(), 4);
        for p in &offsets {
            assert!(!point_in_polygon(*p, &sq), "{:?} should be outside", p);
            let nearest = sq
                .iter()
                .map(|c| c.distance(*p))
                .fold(f64::INFINITY, f64::min);
            assert!((nearest - 10.0).abs() < 1e-6);
        }
        let first = offsets[0];
        assert!(first.x < 0.0 && first.y < 0.0);
    }

    #[test]
    fn offset_corners_skip_degenerate_vertices() {
        let degenerate = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ];
        let offsets = offset_corners(&degenerate, 5.0);
        assert!(offsets.iter().all(|p| p.is_finite()));
        assert!(offsets.len() < 4);

        assert!(offset_corners(&[Point::new(1.0, 1.0)], 5.0).is_empty());
    }

    #[test]
    fn segment_crossing_detects_interior_and_boundary() {
        let sq = square(10.0, -5.0, 10.0);
        assert!(segment_crosses_polygon(
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            &sq
        ));
        assert!(!segment_crosses_polygon(
            Point::new(0.0, 10.0),
            Point::new(30.0, 10.0),
            &sq
        ));
        // fully inside
        assert!(segment_crosses_polygon(
            Point::new(12.0, 0.0),
            Point::new(18.0, 0.0),
            &sq
        ));
        // single-point "polygon" never blocks
        assert!(!segment_crosses_polygon(
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            &[Point::new(15.0, 0.0)]
        ));
    }

    #[test]
    fn overlap_distinguishes_disjoint_shapes() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 5.0, 10.0);
        let far = square(50.0, 50.0, 10.0);
        let touching = square(10.0, 0.0, 10.0);

        assert!(polygons_overlap(&a, &b));
        assert!(!polygons_overlap(&a, &far));
        assert!(polygons_overlap(&a, &touching));
    }

    #[test]
    fn corner_touching_squares_do_not_overlap() {
        let a = square(0.0, 0.0, 10.0);
        let diagonal = square(10.0, 10.0, 10.0);

        assert!(!polygons_overlap(&a, &diagonal));
        assert_eq!(union_outlines(&a, &diagonal).len(), 2);
    }

    #[test]
    fn merged_polygon_contains_both_inputs() {
        let a = square(0.0, 0.0, 20.0);
        let b = square(10.0, 10.0, 20.0);
        let merged = merge_polygons(&a, &b, false);

        assert!(polygon_contains(&merged, &a, SIMPLIFY_TOLERANCE + EPSILON));
        assert!(polygon_contains(&merged, &b, SIMPLIFY_TOLERANCE + EPSILON));
        let expected = 20.0 * 20.0 * 2.0 - 10.0 * 10.0;
        assert!((polygon_area(&merged) - expected).abs() < 1.0);
    }

    #[test]
    fn merging_side_by_side_rectangles_drops_collinear_points() {
        let a = rectangle(0.0, 0.0, 10.0, 10.0);
        let b = rectangle(10.0, 0.0, 20.0, 10.0);
        let merged = merge_polygons(&a, &b, false);
        assert_eq!(merged.len(), 4);
        assert!((polygon_area(&merged) - 200.0).abs() < 1e-6);
    }

    #[test]
    fn quad_clamp_trims_five_vertex_results() {
        let mut pentagon = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(5.0, 10.5),
            Point::new(0.0, 10.0),
        ];
        drop_least_significant(&mut pentagon);
        assert_eq!(pentagon.len(), 4);
        assert!(!pentagon.contains(&Point::new(5.0, 10.5)));
    }

    #[test]
    fn simplify_keeps_at_least_a_triangle() {
        let sliver = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.1),
            Point::new(10.0, 0.0),
            Point::new(5.0, 0.2),
        ];
        assert_eq!(simplify(&sliver, 5.0).len(), 3);
    }

    #[test]
    fn containment_and_distances() {
        let outer = square(0.0, 0.0, 100.0);
        let inner = square(10.0, 10.0, 5.0);
        assert!(polygon_contains(&outer, &inner, 0.0));
        assert!(!polygon_contains(&inner, &outer, 0.0));

        assert_eq!(distance_to_polygon(&outer, Point::new(50.0, 50.0)), 0.0);
        assert!((distance_to_polygon(&outer, Point::new(110.0, 50.0)) - 10.0).abs() < 1e-9);
        assert!(disk_intersects_polygon(Point::new(120.0, 50.0), 25.0, &outer));
        assert!(!disk_intersects_polygon(Point::new(130.0, 50.0), 25.0, &outer));

        let c = centroid(&inner);
        assert!((c.x - 12.5).abs() < 1e-9 && (c.y - 12.5).abs() < 1e-9);
    }
}
