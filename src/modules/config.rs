use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::modules::comms::CommPolicy;
use crate::modules::error::{SimError, SimResult};
use crate::modules::geometry::Point;
use crate::modules::navigation::Bounds;
use crate::modules::rover::RoverParams;

pub const DEFAULT_WORLD_SIZE: f64 = 600.0;
pub const DEFAULT_TARGET: Point = Point { x: 110.0, y: 50.0 };

/// Run parameters. Every field has a default, so partial JSON files work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub rover_count: usize,
    pub policy: CommPolicy,
    /// Probability that a message is dropped in transit.
    pub loss_rate: f64,
    pub world_width: f64,
    pub world_height: f64,
    pub target: Point,
    /// Clearance kept from obstacles by generated start positions.
    pub initial_clearance: f64,
    /// Clearance used for navigation waypoints.
    pub nav_clearance: f64,
    /// Simulated seconds per tick.
    pub tick_size: f64,
    /// World units travelled per tick.
    pub speed: f64,
    pub sensor_range: f64,
    pub candidate_capacity: usize,
    /// Seconds a closed comm gate stays closed.
    pub comm_cooldown: f64,
    pub delay_ms_min: u64,
    pub delay_ms_max: u64,
    pub max_sim_time: f64,
    pub clamp_merges_to_quad: bool,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rover_count: 3,
            policy: CommPolicy::Integrated,
            loss_rate: 0.0,
            world_width: DEFAULT_WORLD_SIZE,
            world_height: DEFAULT_WORLD_SIZE,
            target: DEFAULT_TARGET,
            initial_clearance: 30.0,
            nav_clearance: 15.0,
            tick_size: 0.01,
            speed: 0.2,
            sensor_range: 25.0,
            candidate_capacity: 3,
            comm_cooldown: 1.2,
            delay_ms_min: 50,
            delay_ms_max: 100,
            max_sim_time: 600.0,
            clamp_merges_to_quad: false,
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse {}: {}", path.display(), e),
            )
        })
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.world_width, self.world_height)
    }

    pub fn rover_params(&self) -> RoverParams {
        RoverParams {
            bounds: self.bounds(),
            speed: self.speed,
            sensor_range: self.sensor_range,
            clearance: self.nav_clearance,
            candidate_capacity: self.candidate_capacity,
            clamp_merges_to_quad: self.clamp_merges_to_quad,
        }
    }

    /// Rejects configurations the simulation cannot run.
    pub fn validate(&self) -> SimResult<()> {
        if self.rover_count == 0 {
            return Err(SimError::NoRovers);
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(SimError::InvalidLossRate(self.loss_rate));
        }
        let positive = [
            ("world_width", self.world_width),
            ("world_height", self.world_height),
            ("tick_size", self.tick_size),
            ("speed", self.speed),
            ("sensor_range", self.sensor_range),
            ("max_sim_time", self.max_sim_time),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("nav_clearance", self.nav_clearance),
            ("initial_clearance", self.initial_clearance),
            ("comm_cooldown", self.comm_cooldown),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if self.candidate_capacity == 0 {
            return Err(SimError::InvalidConfig(
                "candidate_capacity must be at least 1".to_string(),
            ));
        }
        if self.delay_ms_min > self.delay_ms_max {
            return Err(SimError::InvalidConfig(format!(
                "delay range {}..={} ms is inverted",
                self.delay_ms_min, self.delay_ms_max
            )));
        }
        if !self.target.is_finite() || !self.bounds().contains(self.target) {
            return Err(SimError::InvalidConfig(format!(
                "target ({}, {}) lies outside the world",
                self.target.x, self.target.y
            )));
        }
        Ok(())
    }
}
