use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::modules::channel::ChannelStats;
use crate::modules::comms::CommPolicy;
use crate::modules::config::SimConfig;
use crate::modules::geometry::Point;
use crate::modules::rover::RoverId;

/// Final numbers for one rover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoverResult {
    pub id: RoverId,
    pub start: Point,
    pub elapsed_time_to_target: Option<f64>,
    pub moved_distance_m: f64,
    pub useful_comms: u64,
    pub not_useful_comms: u64,
    pub known_obstacles: u64,
}

/// Network load and awareness over one simulated second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub time: f64,
    pub active_communications: u64,
    pub mean_known_obstacles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub cycle: u32,
    pub policy: CommPolicy,
    pub seed: Option<u64>,
    pub all_reached: bool,
    pub ticks: u64,
    pub sim_time: f64,
    #[serde(default)]
    pub wall_clock_secs: f64,
    pub useful_comms: u64,
    pub not_useful_comms: u64,
    pub channel: ChannelStats,
    pub rovers: Vec<RoverResult>,
    pub samples: Vec<NetworkSample>,
}

impl RunReport {
    pub fn mean_time_to_target(&self) -> Option<f64> {
        let times: Vec<f64> = self
            .rovers
            .iter()
            .filter_map(|r| r.elapsed_time_to_target)
            .collect();
        if times.is_empty() {
            return None;
        }
        Some(times.iter().sum::<f64>() / times.len() as f64)
    }

    pub fn total_moved_m(&self) -> f64 {
        self.rovers.iter().map(|r| r.moved_distance_m).sum()
    }
}

/// Every cycle of one invocation, with the configuration that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStore {
    pub created_at: String,
    pub config: SimConfig,
    pub runs: Vec<RunReport>,
}

impl ReportStore {
    pub fn new(config: SimConfig) -> Self {
        Self {
            created_at: Utc::now().to_rfc3339(),
            config,
            runs: Vec::new(),
        }
    }

    pub fn push(&mut self, run: RunReport) {
        self.runs.push(run);
    }

    /// Useful and not-useful message counts across all cycles.
    pub fn comm_totals(&self) -> (u64, u64) {
        self.runs.iter().fold((0, 0), |(useful, wasted), run| {
            (
                useful.saturating_add(run.useful_comms),
                wasted.saturating_add(run.not_useful_comms),
            )
        })
    }
}

pub fn reports_dir() -> PathBuf {
    PathBuf::from(".rover-swarm").join("reports")
}

pub fn save_report(store: &ReportStore) -> io::Result<PathBuf> {
    save_report_in(&reports_dir(), store)
}

pub fn save_report_in(dir: &Path, store: &ReportStore) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let path = dir.join(format!("{}-{}.json", store.config.policy.label(), stamp));
    let json = serde_json::to_vec_pretty(store)?;
    fs::write(&path, json)?;
    Ok(path)
}

pub fn load_report(path: &Path) -> io::Result<ReportStore> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to parse report {}: {}", path.display(), e),
        )
    })
}
