use std::fs;
use std::io;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::modules::config::{DEFAULT_TARGET, DEFAULT_WORLD_SIZE};
use crate::modules::error::{SimError, SimResult};
use crate::modules::geometry::{Point, Polygon, disk_intersects_polygon, point_in_polygon, rectangle};
use crate::modules::navigation::Bounds;

/// Draws allowed across all rovers before start generation gives up.
pub const MAX_START_ATTEMPTS: usize = 10_000;

/// Ground-truth world: size, target and obstacles, optionally with fixed starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleMap {
    pub width: f64,
    pub height: f64,
    pub target: Point,
    pub obstacles: Vec<Polygon>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_positions: Vec<Point>,
}

impl Default for ObstacleMap {
    fn default() -> Self {
        default_map()
    }
}

impl ObstacleMap {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.width, self.height)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse map {}: {}", path.display(), e),
            )
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "map size {}x{} must be positive",
                self.width, self.height
            )));
        }
        if !self.bounds().contains(self.target) {
            return Err(SimError::InvalidConfig(format!(
                "map target ({}, {}) lies outside the world",
                self.target.x, self.target.y
            )));
        }
        for (index, obstacle) in self.obstacles.iter().enumerate() {
            if obstacle.len() < 3 || !obstacle.iter().all(|p| p.is_finite()) {
                return Err(SimError::InvalidObstacle { index });
            }
        }
        for (index, start) in self.start_positions.iter().enumerate() {
            if !self.is_free(*start) {
                return Err(SimError::InvalidStart { index });
            }
        }
        Ok(())
    }

    /// Inside the world and outside every obstacle.
    pub fn is_free(&self, point: Point) -> bool {
        point.is_finite()
            && self.bounds().contains(point)
            && !self.obstacles.iter().any(|o| point_in_polygon(point, o))
    }

    /// Start positions for `count` rovers: the map's own if it has enough,
    /// otherwise freshly generated.
    pub fn starts_for<R: Rng>(
        &self,
        count: usize,
        clearance: f64,
        rng: &mut R,
    ) -> SimResult<Vec<Point>> {
        if self.start_positions.is_empty() {
            return generate_start_positions(self, count, clearance, rng);
        }
        if self.start_positions.len() < count {
            return Err(SimError::NotEnoughStarts {
                need: count,
                have: self.start_positions.len(),
            });
        }
        Ok(self.start_positions[..count].to_vec())
    }
}

/// Random integer start positions keeping `clearance` from every obstacle.
pub fn generate_start_positions<R: Rng>(
    map: &ObstacleMap,
    count: usize,
    clearance: f64,
    rng: &mut R,
) -> SimResult<Vec<Point>> {
    if !(map.width.is_finite()
        && map.width > 0.0
        && map.height.is_finite()
        && map.height > 0.0)
    {
        return Err(SimError::InvalidConfig(format!(
            "map size {}x{} must be positive",
            map.width, map.height
        )));
    }
    let max_x = map.width.floor() as i64;
    let max_y = map.height.floor() as i64;
    let mut starts = Vec::with_capacity(count);
    let mut attempts = 0;

    while starts.len() < count {
        if attempts >= MAX_START_ATTEMPTS {
            return Err(SimError::StartPositionsExhausted { attempts });
        }
        attempts += 1;

        let candidate = Point::new(
            rng.gen_range(0..=max_x) as f64,
            rng.gen_range(0..=max_y) as f64,
        );
        let blocked = map.obstacles.iter().any(|o| {
            point_in_polygon(candidate, o) || disk_intersects_polygon(candidate, clearance, o)
        });
        if !blocked {
            starts.push(candidate);
        }
    }
    Ok(starts)
}

/// Built-in 600x600 research map with the target near the top-left corner.
pub fn default_map() -> ObstacleMap {
    let obstacles = [
        (150.0, 30.0, 190.0, 110.0),
        (60.0, 120.0, 200.0, 150.0),
        (250.0, 200.0, 330.0, 240.0),
        (400.0, 80.0, 440.0, 260.0),
        (100.0, 300.0, 180.0, 380.0),
        (300.0, 330.0, 420.0, 360.0),
        (480.0, 400.0, 520.0, 520.0),
        (200.0, 460.0, 340.0, 500.0),
        (50.0, 470.0, 120.0, 540.0),
    ]
    .into_iter()
    .map(|(min_x, min_y, max_x, max_y)| rectangle(min_x, min_y, max_x, max_y))
    .collect();

    ObstacleMap {
        width: DEFAULT_WORLD_SIZE,
        height: DEFAULT_WORLD_SIZE,
        target: DEFAULT_TARGET,
        obstacles,
        start_positions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::geometry::distance_to_polygon;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_map_is_valid() {
        let map = default_map();
        assert!(map.validate().is_ok());
        assert!(map.is_free(map.target));
        assert_eq!(map.obstacles.len(), 9);
    }

    #[test]
    fn generated_starts_keep_clearance() {
        let map = default_map();
        let mut rng = StdRng::seed_from_u64(3);
        let starts = generate_start_positions(&map, 50, 30.0, &mut rng).unwrap();

        assert_eq!(starts.len(), 50);
        for start in &starts {
            assert_eq!(start.x.fract(), 0.0);
            assert!(map.is_free(*start));
            assert!(map.obstacles.iter().all(|o| distance_to_polygon(o, *start) > 30.0));
        }
    }

    #[test]
    fn generation_is_seeded() {
        let map = default_map();
        let a = generate_start_positions(&map, 5, 30.0, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = generate_start_positions(&map, 5, 30.0, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn crowded_map_exhausts_attempts() {
        let map = ObstacleMap {
            obstacles: vec![rectangle(-10.0, -10.0, 610.0, 610.0)],
            ..default_map()
        };
        let result = generate_start_positions(&map, 1, 0.0, &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(SimError::StartPositionsExhausted { .. })));
    }

    #[test]
    fn non_positive_size_is_an_error_not_a_panic() {
        let mut rng = StdRng::seed_from_u64(1);
        let narrow = ObstacleMap {
            width: -5.0,
            ..default_map()
        };
        assert!(matches!(
            generate_start_positions(&narrow, 1, 30.0, &mut rng),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(narrow.validate(), Err(SimError::InvalidConfig(_))));

        let flat = ObstacleMap {
            height: 0.0,
            ..default_map()
        };
        assert!(matches!(
            generate_start_positions(&flat, 1, 30.0, &mut rng),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fixed_starts_are_used_and_counted() {
        let map = ObstacleMap {
            start_positions: vec![Point::new(10.0, 10.0), Point::new(500.0, 20.0)],
            ..default_map()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(map.starts_for(2, 30.0, &mut rng).unwrap().len(), 2);
        assert!(matches!(
            map.starts_for(3, 30.0, &mut rng),
            Err(SimError::NotEnoughStarts { need: 3, have: 2 })
        ));
    }

    #[test]
    fn invalid_obstacles_and_starts_rejected() {
        let mut map = default_map();
        map.obstacles.push(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert!(matches!(
            map.validate(),
            Err(SimError::InvalidObstacle { index: 9 })
        ));

        let mut map = default_map();
        map.start_positions = vec![Point::new(160.0, 50.0)];
        assert!(matches!(map.validate(), Err(SimError::InvalidStart { index: 0 })));
    }

    #[test]
    fn map_json_accepts_missing_starts() {
        let json = r#"{
            "width": 100.0, "height": 100.0, "target": [50.0, 50.0],
            "obstacles": [[[10.0, 10.0], [20.0, 10.0], [20.0, 20.0]]]
        }"#;
        let map: ObstacleMap = serde_json::from_str(json).unwrap();
        assert!(map.start_positions.is_empty());
        assert!(map.validate().is_ok());
    }
}
