use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::modules::geometry::{
    EPSILON, Point, Polygon, offset_corners, point_in_polygon, segment_crosses_polygon,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, point: Point) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }

    pub fn diagonal(&self) -> f64 {
        self.width.hypot(self.height)
    }
}

/// Clearance waypoints around every obstacle that lie in the world and
/// outside every obstacle.
pub fn clearance_waypoints(obstacles: &[Polygon], bounds: Bounds, clearance: f64) -> Vec<Point> {
    obstacles
        .iter()
        .flat_map(|obstacle| offset_corners(obstacle, clearance))
        .filter(|p| bounds.contains(*p))
        .filter(|p| !obstacles.iter().any(|o| point_in_polygon(*p, o)))
        .collect()
}

/// Plans a route from `start` to `target` around `obstacles`.
///
/// Returns the waypoints after `start`, ending with `target`, or an empty
/// list when the target cannot be reached with current knowledge.
pub fn plan_path(
    obstacles: &[Polygon],
    start: Point,
    target: Point,
    bounds: Bounds,
    clearance: f64,
) -> Vec<Point> {
    let waypoints = clearance_waypoints(obstacles, bounds, clearance);
    search(start, target, &waypoints, obstacles)
}

#[derive(Clone, Copy, Debug)]
struct Frontier {
    priority: f64,
    order: u64,
    node: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed so the max-heap pops the lowest priority, then the earliest pushed.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

const START: usize = 0;
const TARGET: usize = 1;

/// A* over the visibility graph of `{start, target, waypoints}`.
pub fn search(start: Point, target: Point, waypoints: &[Point], obstacles: &[Polygon]) -> Vec<Point> {
    if start.distance(target) <= EPSILON {
        return vec![target];
    }

    let mut nodes = Vec::with_capacity(waypoints.len() + 2);
    nodes.push(start);
    nodes.push(target);
    nodes.extend_from_slice(waypoints);

    // Leaving the start ignores obstacles that already enclose it.
    let enclosing_start: Vec<bool> = obstacles
        .iter()
        .map(|o| point_in_polygon(start, o))
        .collect();

    let visible = |from: usize, to: usize| {
        let (a, b) = (nodes[from], nodes[to]);
        let leaves_start = from == START || to == START;
        !obstacles
            .iter()
            .zip(&enclosing_start)
            .filter(|(_, encloses)| !(leaves_start && **encloses))
            .any(|(o, _)| segment_crosses_polygon(a, b, o))
    };

    let n = nodes.len();
    let mut g = vec![f64::INFINITY; n];
    let mut came_from: Vec<Option<usize>> = vec![None; n];
    let mut closed = vec![false; n];
    let mut open = BinaryHeap::new();
    let mut order = 0u64;

    g[START] = 0.0;
    open.push(Frontier {
        priority: start.distance(target),
        order,
        node: START,
    });

    while let Some(Frontier { node, .. }) = open.pop() {
        if closed[node] {
            continue;
        }
        closed[node] = true;

        if node == TARGET {
            return reconstruct(&nodes, &came_from);
        }

        for next in 0..n {
            if next == node || closed[next] {
                continue;
            }
            let tentative = g[node] + nodes[node].distance(nodes[next]);
            if tentative >= g[next] || !visible(node, next) {
                continue;
            }
            g[next] = tentative;
            came_from[next] = Some(node);
            order += 1;
            open.push(Frontier {
                priority: tentative + nodes[next].distance(target),
                order,
                node: next,
            });
        }
    }

    Vec::new()
}

fn reconstruct(nodes: &[Point], came_from: &[Option<usize>]) -> Vec<Point> {
    let mut path = vec![nodes[TARGET]];
    let mut current = TARGET;
    while let Some(previous) = came_from[current] {
        if previous == START {
            break;
        }
        path.push(nodes[previous]);
        current = previous;
    }
    path.reverse();
    path
}

/// Length of the polyline `position -> path[0] -> ... -> path[n-1]`.
pub fn path_length(position: Point, path: &[Point]) -> f64 {
    let mut total = 0.0;
    let mut from = position;
    for &to in path {
        total += from.distance(to);
        from = to;
    }
    total
}
