use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::modules::geometry::{EPSILON, Point, Polygon, disk_intersects_polygon};
use crate::modules::navigation::{Bounds, path_length, plan_path};
use crate::modules::world_model::WorldModel;

pub type RoverId = u64;

/// Within this distance a waypoint counts as reached.
pub const SNAP_DISTANCE: f64 = 1.0;
/// World units per metre when reporting moved distance.
pub const UNITS_PER_METRE: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoverState {
    Moving,
    Reached,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoverParams {
    pub bounds: Bounds,
    pub speed: f64,
    pub sensor_range: f64,
    pub clearance: f64,
    pub candidate_capacity: usize,
    pub clamp_merges_to_quad: bool,
}

/// Bounded FIFO of sensed shapes waiting to be broadcast.
#[derive(Clone, Debug)]
pub struct CommCandidates {
    queue: VecDeque<Polygon>,
    capacity: usize,
}

impl CommCandidates {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Queues a shape, returning the evicted oldest entry when full.
    pub fn push(&mut self, shape: Polygon) -> Option<Polygon> {
        let evicted = if self.queue.len() >= self.capacity {
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(shape);
        evicted
    }

    pub fn front(&self) -> Option<&Polygon> {
        self.queue.front()
    }

    pub fn pop_front(&mut self) -> Option<Polygon> {
        self.queue.pop_front()
    }

    pub fn remove(&mut self, shape: &[Point]) -> bool {
        match self.queue.iter().position(|c| c.as_slice() == shape) {
            Some(idx) => {
                self.queue.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Polygon> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Broadcast throttle used by the timing-style policies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CommGate {
    open: bool,
    closed_at: f64,
}

impl Default for CommGate {
    fn default() -> Self {
        Self {
            open: true,
            closed_at: 0.0,
        }
    }
}

impl CommGate {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self, now: f64) {
        self.open = false;
        self.closed_at = now;
    }

    /// Reopens once `cooldown` simulated seconds have passed since closing.
    pub fn reopen_if_due(&mut self, now: f64, cooldown: f64) -> bool {
        if self.open || now - self.closed_at + EPSILON < cooldown {
            return false;
        }
        self.open = true;
        true
    }

    pub fn closed_at(&self) -> Option<f64> {
        (!self.open).then_some(self.closed_at)
    }
}

/// Result of one Sense phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sensing {
    /// Ground-truth indices newly fused this tick.
    pub discovered: Vec<usize>,
    /// `Some(found)` if the rover replanned, `found` telling whether a path exists.
    pub replanned: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Motion {
    /// No path available; the rover holds position.
    Held,
    Moved { distance: f64 },
    /// A waypoint was reached and the route recomputed.
    WaypointReached { path_found: bool },
    Arrived { elapsed: f64 },
    Idle,
}

/// How a delivered message affected its receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reception {
    /// Changed the receiver's route.
    Useful,
    AlreadyKnown,
    /// New knowledge that did not touch the current route.
    NotActionable,
    AfterArrival,
}

impl Reception {
    pub fn is_useful(self) -> bool {
        matches!(self, Reception::Useful)
    }
}

#[derive(Clone, Debug)]
pub struct Rover {
    pub id: RoverId,
    pub position: Point,
    pub target: Point,
    pub state: RoverState,
    pub world_model: WorldModel,
    pub candidates: CommCandidates,
    pub path: Vec<Point>,
    pub distance_to_target: f64,
    pub known_obstacles: u64,
    pub active_communications: u64,
    pub useful_comms: u64,
    pub not_useful_comms: u64,
    pub moved_distance: f64,
    pub elapsed_time_to_target: Option<f64>,
    pub comm_gate: CommGate,
    /// Fingerprints of shapes this rover already broadcast (utility-aware policy).
    pub sent_fingerprints: HashSet<String>,
}

impl Rover {
    pub fn new(id: RoverId, start: Point, target: Point, params: &RoverParams) -> Self {
        let path = vec![target];
        Self {
            id,
            position: start,
            target,
            state: RoverState::Moving,
            world_model: WorldModel::new(params.clamp_merges_to_quad),
            candidates: CommCandidates::new(params.candidate_capacity),
            distance_to_target: path_length(start, &path),
            path,
            known_obstacles: 0,
            active_communications: 0,
            useful_comms: 0,
            not_useful_comms: 0,
            moved_distance: 0.0,
            elapsed_time_to_target: None,
            comm_gate: CommGate::default(),
            sent_fingerprints: HashSet::new(),
        }
    }

    pub fn is_reached(&self) -> bool {
        self.state == RoverState::Reached
    }

    pub fn comm_active(&self) -> bool {
        self.comm_gate.is_open()
    }

    pub fn moved_distance_m(&self) -> f64 {
        self.moved_distance / UNITS_PER_METRE
    }

    pub fn refresh_distance(&mut self) {
        self.distance_to_target = if self.path.is_empty() {
            self.position.distance(self.target)
        } else {
            path_length(self.position, &self.path)
        };
    }

    /// Recomputes the route from the current position; returns whether one exists.
    pub fn replan(&mut self, params: &RoverParams) -> bool {
        self.path = plan_path(
            self.world_model.polygons(),
            self.position,
            self.target,
            params.bounds,
            params.clearance,
        );
        self.refresh_distance();
        !self.path.is_empty()
    }

    pub fn path_blocked(&self) -> bool {
        self.world_model.blocks_path(self.position, &self.path)
    }

    /// Fuses every unknown ground-truth obstacle within sensor range.
    pub fn sense(&mut self, ground_truth: &[Polygon], params: &RoverParams) -> Sensing {
        let mut sensing = Sensing::default();
        if self.is_reached() {
            return sensing;
        }

        for (index, obstacle) in ground_truth.iter().enumerate() {
            if !disk_intersects_polygon(self.position, params.sensor_range, obstacle)
                || self.world_model.already_known(obstacle)
            {
                continue;
            }

            self.known_obstacles += 1;
            self.candidates.push(obstacle.clone());
            self.world_model.insert(obstacle);
            sensing.discovered.push(index);

            if self.path_blocked() {
                sensing.replanned = Some(self.replan(params));
            }
        }
        sensing
    }

    pub fn step(&mut self, params: &RoverParams, now: f64) -> Motion {
        if self.is_reached() {
            return Motion::Idle;
        }
        if self.path.is_empty() && !self.replan(params) {
            if self.position.distance(self.target) <= SNAP_DISTANCE {
                return self.arrive(now);
            }
            return Motion::Held;
        }

        let next = self.path[0];
        let remaining = self.position.distance(next);

        if remaining <= SNAP_DISTANCE {
            self.moved_distance += remaining;
            self.position = next;
            self.path.remove(0);
            self.refresh_distance();

            if self.path.is_empty() && self.distance_to_target <= SNAP_DISTANCE {
                return self.arrive(now);
            }
            let path_found = self.replan(params);
            return Motion::WaypointReached { path_found };
        }

        let travel = params.speed.min(remaining);
        let heading = (next - self.position) * (1.0 / remaining);
        self.position = self.position + heading * travel;
        self.moved_distance += travel;
        self.refresh_distance();
        Motion::Moved { distance: travel }
    }

    fn arrive(&mut self, now: f64) -> Motion {
        self.state = RoverState::Reached;
        self.path.clear();
        self.distance_to_target = 0.0;
        let elapsed = *self.elapsed_time_to_target.get_or_insert(now);
        Motion::Arrived { elapsed }
    }

    /// Message intake: fuse the shape and replan if it blocks the route.
    pub fn receive(&mut self, shape: &[Point], params: &RoverParams) -> Reception {
        let reception = if self.is_reached() {
            Reception::AfterArrival
        } else if self.world_model.already_known(shape) {
            Reception::AlreadyKnown
        } else {
            self.known_obstacles += 1;
            self.world_model.insert(shape);
            if self.path_blocked() {
                self.replan(params);
                Reception::Useful
            } else {
                Reception::NotActionable
            }
        };

        if reception.is_useful() {
            self.useful_comms += 1;
        } else {
            self.not_useful_comms += 1;
        }
        reception
    }
}
