use crate::modules::geometry::{
    EPSILON, Point, Polygon, SIMPLIFY_TOLERANCE, merge_polygons,
    polygon_area, polygon_contains, polygons_overlap, segment_crosses_polygon,
};

/// Containment slack: fused shapes may sit up to one simplification step
/// inside the obstacles they were built from.
pub const CONTAINMENT_TOLERANCE: f64 = SIMPLIFY_TOLERANCE + EPSILON;

/// What `WorldModel::insert` did with a shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fusion {
    Appended { index: usize },
    Merged { index: usize },
    Ignored,
}

/// A rover's private belief about which areas are blocked.
#[derive(Clone, Debug, Default)]
pub struct WorldModel {
    polygons: Vec<Polygon>,
    clamp_merges_to_quad: bool,
}

impl WorldModel {
    pub fn new(clamp_merges_to_quad: bool) -> Self {
        Self {
            polygons: Vec::new(),
            clamp_merges_to_quad,
        }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn total_area(&self) -> f64 {
        self.polygons.iter().map(|p| polygon_area(p)).sum()
    }

    pub fn already_known(&self, shape: &[Point]) -> bool {
        self.polygons
            .iter()
            .any(|known| polygon_contains(known, shape, CONTAINMENT_TOLERANCE))
    }

    /// Fuses `shape` into the first overlapping polygon, or appends it.
    ///
    /// Only one merge happens per call; a shape bridging two known polygons
    /// leaves the second one untouched.
    pub fn insert(&mut self, shape: &[Point]) -> Fusion {
        if shape.len() < 3 {
            return Fusion::Ignored;
        }

        let overlapping = self
            .polygons
            .iter()
            .position(|known| polygons_overlap(shape, known));

        match overlapping {
            Some(index) => {
                let merged = merge_polygons(shape, &self.polygons[index], self.clamp_merges_to_quad);
                self.polygons[index] = merged;
                Fusion::Merged { index }
            }
            None => {
                self.polygons.push(shape.to_vec());
                Fusion::Appended {
                    index: self.polygons.len() - 1,
                }
            }
        }
    }

    /// True if the polyline `position -> path[0] -> ... -> path[n-1]` crosses
    /// any known polygon.
    pub fn blocks_path(&self, position: Point, path: &[Point]) -> bool {
        if path.is_empty() {
            return false;
        }
        let mut from = position;
        for &to in path {
            if self
                .polygons
                .iter()
                .any(|poly| segment_crosses_polygon(from, to, poly))
            {
                return true;
            }
            from = to;
        }
        false
    }
}
