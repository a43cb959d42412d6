use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::modules::channel::{Channel, ChannelStats, Outcome};
use crate::modules::comms::{Peer, SwarmView};
use crate::modules::config::SimConfig;
use crate::modules::error::{SimError, SimResult};
use crate::modules::geometry::{EPSILON, Point, Polygon};
use crate::modules::map::ObstacleMap;
use crate::modules::report::{NetworkSample, RoverResult, RunReport};
use crate::modules::rover::{Motion, Reception, Rover, RoverId, RoverParams};

/// Simulated seconds between network samples.
pub const SAMPLE_INTERVAL: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    TickStarted {
        tick: u64,
    },
    TickCompleted {
        tick: u64,
    },
    ObstacleSensed {
        rover: RoverId,
        obstacle: usize,
    },
    PathReplanned {
        rover: RoverId,
        waypoints: usize,
    },
    PathLost {
        rover: RoverId,
    },
    MessageSent {
        sender: RoverId,
        receiver: RoverId,
        due: f64,
    },
    MessageLost {
        sender: RoverId,
        receiver: RoverId,
    },
    MessageReceived {
        sender: RoverId,
        receiver: RoverId,
        reception: Reception,
    },
    CommGateClosed {
        rover: RoverId,
    },
    CommGateReopened {
        rover: RoverId,
    },
    RoverReached {
        rover: RoverId,
        elapsed: f64,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::TickStarted { tick } => write!(f, "tick {} started", tick),
            Event::TickCompleted { tick } => write!(f, "tick {} completed", tick),
            Event::ObstacleSensed { rover, obstacle } => {
                write!(f, "rover {} sensed obstacle {}", rover, obstacle)
            }
            Event::PathReplanned { rover, waypoints } => {
                write!(f, "rover {} replanned ({} waypoints)", rover, waypoints)
            }
            Event::PathLost { rover } => write!(f, "rover {} has no known path", rover),
            Event::MessageSent {
                sender,
                receiver,
                due,
            } => write!(f, "rover {} -> {} sent, due {:.2}s", sender, receiver, due),
            Event::MessageLost { sender, receiver } => {
                write!(f, "rover {} -> {} lost", sender, receiver)
            }
            Event::MessageReceived {
                sender,
                receiver,
                reception,
            } => write!(f, "rover {} -> {} received ({:?})", sender, receiver, reception),
            Event::CommGateClosed { rover } => write!(f, "rover {} comm gate closed", rover),
            Event::CommGateReopened { rover } => write!(f, "rover {} comm gate reopened", rover),
            Event::RoverReached { rover, elapsed } => {
                write!(f, "rover {} reached the target after {:.2}s", rover, elapsed)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct TickReport {
    pub tick: u64,
    pub time: f64,
    pub events: Vec<Event>,
}

/// Tick driver that owns every rover and the channel between them.
pub struct Simulation {
    config: SimConfig,
    params: RoverParams,
    target: Point,
    ground_truth: Vec<Polygon>,
    starts: BTreeMap<RoverId, Point>,
    rovers: BTreeMap<RoverId, Rover>,
    channel: Channel,
    tick: u64,
    samples: Vec<NetworkSample>,
    next_sample_at: f64,
}

impl Simulation {
    /// Builds a run; rovers get ids `1..=n` in the order of `starts`.
    pub fn new(config: SimConfig, map: &ObstacleMap, starts: &[Point]) -> SimResult<Self> {
        config.validate()?;
        map.validate()?;
        if starts.len() < config.rover_count {
            return Err(SimError::NotEnoughStarts {
                need: config.rover_count,
                have: starts.len(),
            });
        }
        for (index, start) in starts.iter().enumerate().take(config.rover_count) {
            if !map.is_free(*start) {
                return Err(SimError::InvalidStart { index });
            }
        }

        let mut params = config.rover_params();
        params.bounds = map.bounds();

        let starts: BTreeMap<RoverId, Point> = (1..)
            .zip(starts.iter().copied())
            .take(config.rover_count)
            .collect();
        let rovers = starts
            .iter()
            .map(|(&id, &start)| (id, Rover::new(id, start, map.target, &params)))
            .collect();
        let channel = Channel::new(
            config.loss_rate,
            config.delay_ms_min..=config.delay_ms_max,
            config.seed,
        );

        info!(
            rovers = config.rover_count,
            policy = %config.policy,
            loss_rate = config.loss_rate,
            obstacles = map.obstacles.len(),
            "simulation created"
        );

        Ok(Self {
            params,
            target: map.target,
            ground_truth: map.obstacles.clone(),
            starts,
            rovers,
            channel,
            tick: 0,
            samples: Vec::new(),
            next_sample_at: SAMPLE_INTERVAL,
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated time at the start of the next tick.
    pub fn now(&self) -> f64 {
        self.tick as f64 * self.config.tick_size
    }

    pub fn rovers(&self) -> impl Iterator<Item = &Rover> {
        self.rovers.values()
    }

    pub fn rover(&self, id: RoverId) -> Option<&Rover> {
        self.rovers.get(&id)
    }

    pub fn samples(&self) -> &[NetworkSample] {
        &self.samples
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    pub fn all_reached(&self) -> bool {
        self.rovers.values().all(Rover::is_reached)
    }

    pub fn timed_out(&self) -> bool {
        self.now() >= self.config.max_sim_time
    }

    fn swarm_view(&self) -> SwarmView {
        SwarmView {
            peers: self.rovers.values().map(Peer::of).collect(),
            target: self.target,
            ground_truth_len: self.ground_truth.len(),
            world_diagonal: self.params.bounds.diagonal(),
        }
    }

    /// Advances every rover by one tick.
    pub fn step(&mut self) -> TickReport {
        let tick = self.tick;
        let now = self.now();
        let mut events = vec![Event::TickStarted { tick }];
        trace!(tick, time = now, "tick started");

        let ids: Vec<RoverId> = self.rovers.keys().copied().collect();
        for id in ids {
            self.deliver_due(now, &mut events);
            self.rover_turn(id, now, &mut events);
        }

        self.tick += 1;
        self.record_sample();
        events.push(Event::TickCompleted { tick });

        TickReport {
            tick,
            time: now,
            events,
        }
    }

    fn deliver_due(&mut self, now: f64, events: &mut Vec<Event>) {
        for outcome in self.channel.take_due(now) {
            match outcome {
                Outcome::Lost(message) => {
                    debug!(
                        sender = message.sender,
                        receiver = message.receiver,
                        "message lost"
                    );
                    events.push(Event::MessageLost {
                        sender: message.sender,
                        receiver: message.receiver,
                    });
                }
                Outcome::Delivered(message) => {
                    if message.sender == message.receiver {
                        debug!(rover = message.sender, "dropping message addressed to its sender");
                        continue;
                    }
                    let Some(receiver) = self.rovers.get_mut(&message.receiver) else {
                        debug!(receiver = message.receiver, "dropping message for unknown rover");
                        continue;
                    };
                    let reception = receiver.receive(&message.obstacle, &self.params);
                    debug!(
                        sender = message.sender,
                        receiver = message.receiver,
                        ?reception,
                        "message received"
                    );
                    events.push(Event::MessageReceived {
                        sender: message.sender,
                        receiver: message.receiver,
                        reception,
                    });
                }
            }
        }
    }

    fn rover_turn(&mut self, id: RoverId, now: f64, events: &mut Vec<Event>) {
        let view = self.swarm_view();
        let policy = self.config.policy;
        let cooldown = self.config.comm_cooldown;

        let Some(rover) = self.rovers.get_mut(&id) else {
            return;
        };
        if rover.is_reached() {
            return;
        }

        if rover.comm_gate.reopen_if_due(now, cooldown) {
            trace!(rover = id, time = now, "comm gate reopened");
            events.push(Event::CommGateReopened { rover: id });
        }

        let sensing = rover.sense(&self.ground_truth, &self.params);
        for obstacle in sensing.discovered {
            debug!(rover = id, obstacle, "obstacle sensed");
            events.push(Event::ObstacleSensed { rover: id, obstacle });
        }
        if let Some(found) = sensing.replanned {
            events.push(replan_event(rover, found));
        }

        let gate_was_open = rover.comm_active();
        let dispatches = policy.consider_broadcast(rover, &view, now);
        if gate_was_open && !rover.comm_active() {
            events.push(Event::CommGateClosed { rover: id });
        }

        match rover.step(&self.params, now) {
            Motion::Arrived { elapsed } => {
                info!(rover = id, elapsed, "rover reached the target");
                events.push(Event::RoverReached { rover: id, elapsed });
            }
            Motion::WaypointReached { path_found } => {
                events.push(replan_event(rover, path_found));
            }
            Motion::Held => trace!(rover = id, "holding position"),
            Motion::Moved { .. } | Motion::Idle => {}
        }

        for dispatch in dispatches {
            let (sender, receiver) = (dispatch.sender, dispatch.receiver);
            let due = self.channel.dispatch(dispatch, now);
            if let Some(peer) = self.rovers.get_mut(&receiver) {
                peer.active_communications += 1;
            }
            debug!(sender, receiver, due, "message sent");
            events.push(Event::MessageSent {
                sender,
                receiver,
                due,
            });
        }
    }

    fn record_sample(&mut self) {
        let elapsed = self.now();
        while elapsed + EPSILON >= self.next_sample_at {
            let active_communications = self
                .rovers
                .values_mut()
                .map(|r| std::mem::take(&mut r.active_communications))
                .sum();
            let mean_known_obstacles = self
                .rovers
                .values()
                .map(|r| r.known_obstacles as f64)
                .sum::<f64>()
                / self.rovers.len().max(1) as f64;
            self.samples.push(NetworkSample {
                time: self.next_sample_at,
                active_communications,
                mean_known_obstacles,
            });
            self.next_sample_at += SAMPLE_INTERVAL;
        }
    }

    /// Steps until every rover arrived or the time bound is hit.
    pub fn run(&mut self) -> bool {
        while !self.all_reached() && !self.timed_out() {
            self.step();
        }
        let reached = self.all_reached();
        let stats = self.channel.stats();
        info!(
            ticks = self.tick,
            time = self.now(),
            reached,
            sent = stats.sent,
            delivered = stats.delivered,
            lost = stats.lost,
            in_flight = stats.in_flight,
            "simulation finished"
        );
        reached
    }

    pub fn report(&self, cycle: u32, started_at: Instant) -> RunReport {
        let rovers: Vec<RoverResult> = self
            .rovers
            .values()
            .map(|r| RoverResult {
                id: r.id,
                start: self.starts.get(&r.id).copied().unwrap_or(r.position),
                elapsed_time_to_target: r.elapsed_time_to_target,
                moved_distance_m: r.moved_distance_m(),
                useful_comms: r.useful_comms,
                not_useful_comms: r.not_useful_comms,
                known_obstacles: r.known_obstacles,
            })
            .collect();

        RunReport {
            cycle,
            policy: self.config.policy,
            seed: self.config.seed,
            all_reached: self.all_reached(),
            ticks: self.tick,
            sim_time: self.now(),
            wall_clock_secs: started_at.elapsed().as_secs_f64(),
            useful_comms: rovers.iter().map(|r| r.useful_comms).sum(),
            not_useful_comms: rovers.iter().map(|r| r.not_useful_comms).sum(),
            channel: self.channel.stats(),
            rovers,
            samples: self.samples.clone(),
        }
    }
}

fn replan_event(rover: &Rover, found: bool) -> Event {
    if found {
        debug!(rover = rover.id, waypoints = rover.path.len(), "path replanned");
        Event::PathReplanned {
            rover: rover.id,
            waypoints: rover.path.len(),
        }
    } else {
        debug!(rover = rover.id, "no path with current knowledge");
        Event::PathLost { rover: rover.id }
    }
}
