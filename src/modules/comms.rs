use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::modules::geometry::{Point, Polygon, centroid, distance_to_polygon, polygon_area};
use crate::modules::rover::{Rover, RoverId};

/// Forecast horizon and growth used by the plan-aware policy.
pub const PLAN_HORIZON: u32 = 5;
pub const PLAN_GROWTH: f64 = 1.2;
pub const PLAN_THRESHOLD: f64 = 0.5;
const PLAN_WEIGHT_TARGET: f64 = 0.4;
const PLAN_WEIGHT_PROXIMITY: f64 = 0.3;
const PLAN_WEIGHT_UNKNOWN: f64 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CommPolicy {
    /// Never communicate.
    #[value(alias = "nocom")]
    None,
    /// Head of the queue to everyone, then back off.
    #[value(alias = "timcom")]
    TimingSelective,
    /// Only obstacles closer to the target than the swarm's mean distance.
    #[value(alias = "concom")]
    ContentSelective,
    /// Only to rovers farther from the target than the sender.
    #[value(alias = "reccom")]
    ReceiverSelective,
    /// Content and receiver filters behind the timing gate.
    #[default]
    #[value(alias = "intcom")]
    Integrated,
    /// Everything to everyone.
    #[value(alias = "fulcom")]
    Full,
    /// Receivers whose uncertainty forecast crosses the threshold now.
    #[value(alias = "placom")]
    PlanAware,
    /// Candidates ranked by usefulness, duplicates suppressed.
    #[value(alias = "uticom")]
    UtilityAware,
}

impl CommPolicy {
    pub const ALL: [CommPolicy; 8] = [
        CommPolicy::None,
        CommPolicy::TimingSelective,
        CommPolicy::ContentSelective,
        CommPolicy::ReceiverSelective,
        CommPolicy::Integrated,
        CommPolicy::Full,
        CommPolicy::PlanAware,
        CommPolicy::UtilityAware,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CommPolicy::None => "none",
            CommPolicy::TimingSelective => "timing-selective",
            CommPolicy::ContentSelective => "content-selective",
            CommPolicy::ReceiverSelective => "receiver-selective",
            CommPolicy::Integrated => "integrated",
            CommPolicy::Full => "full",
            CommPolicy::PlanAware => "plan-aware",
            CommPolicy::UtilityAware => "utility-aware",
        }
    }

    /// Short name used in experiment logs.
    pub const fn alias(self) -> &'static str {
        match self {
            CommPolicy::None => "nocom",
            CommPolicy::TimingSelective => "timcom",
            CommPolicy::ContentSelective => "concom",
            CommPolicy::ReceiverSelective => "reccom",
            CommPolicy::Integrated => "intcom",
            CommPolicy::Full => "fulcom",
            CommPolicy::PlanAware => "placom",
            CommPolicy::UtilityAware => "uticom",
        }
    }

    pub const fn summary(self) -> &'static str {
        match self {
            CommPolicy::None => "no communication",
            CommPolicy::TimingSelective => "queue head to every active rover, then 1.2 s back-off",
            CommPolicy::ContentSelective => "obstacles nearer the target than the swarm's mean distance",
            CommPolicy::ReceiverSelective => "everything, only to rovers farther from the target",
            CommPolicy::Integrated => "content and receiver filters behind the timing back-off",
            CommPolicy::Full => "everything to every active rover",
            CommPolicy::PlanAware => "everything, to rovers whose uncertainty forecast crosses now",
            CommPolicy::UtilityAware => "ranked by usefulness, duplicates suppressed",
        }
    }

    /// Policies that close the comm gate after a broadcast.
    pub const fn uses_gate(self) -> bool {
        matches!(self, CommPolicy::TimingSelective | CommPolicy::Integrated)
    }

    /// Decides what `sender` broadcasts this tick and to whom.
    ///
    /// Consumed candidates leave the sender's queue. Nothing is consumed and
    /// the gate is left alone when there is no candidate or no receiver.
    pub fn consider_broadcast(
        self,
        sender: &mut Rover,
        swarm: &SwarmView,
        now: f64,
    ) -> Vec<Dispatch> {
        match self {
            CommPolicy::None => Vec::new(),
            CommPolicy::TimingSelective => timing_selective(sender, swarm, now),
            CommPolicy::ContentSelective => {
                let candidates = content_filter(sender, swarm);
                let receivers = swarm.active_except(sender.id);
                send_and_remove(sender, &candidates, &receivers)
            }
            CommPolicy::ReceiverSelective => {
                let candidates: Vec<Polygon> = sender.candidates.iter().cloned().collect();
                let receivers = swarm.farther_than(sender);
                send_and_remove(sender, &candidates, &receivers)
            }
            CommPolicy::Integrated => integrated(sender, swarm, now),
            CommPolicy::Full => {
                let candidates: Vec<Polygon> = sender.candidates.iter().cloned().collect();
                let receivers = swarm.active_except(sender.id);
                let dispatches = fan_out(sender.id, &candidates, &receivers);
                if !dispatches.is_empty() {
                    sender.candidates.clear();
                }
                dispatches
            }
            CommPolicy::PlanAware => plan_aware(sender, swarm),
            CommPolicy::UtilityAware => utility_aware(sender, swarm),
        }
    }
}

impl fmt::Display for CommPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for CommPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        CommPolicy::ALL
            .into_iter()
            .find(|p| p.label() == wanted || p.alias() == wanted)
            .ok_or_else(|| format!("unknown communication policy: {}", s))
    }
}

/// What a policy may see of another rover.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peer {
    pub id: RoverId,
    pub position: Point,
    pub distance_to_target: f64,
    pub reached: bool,
    pub known_obstacles: u64,
}

impl Peer {
    pub fn of(rover: &Rover) -> Self {
        Self {
            id: rover.id,
            position: rover.position,
            distance_to_target: rover.distance_to_target,
            reached: rover.is_reached(),
            known_obstacles: rover.known_obstacles,
        }
    }
}

/// Read-only snapshot of the swarm taken before a rover's turn.
#[derive(Clone, Debug, Default)]
pub struct SwarmView {
    pub peers: Vec<Peer>,
    pub target: Point,
    pub ground_truth_len: usize,
    pub world_diagonal: f64,
}

impl SwarmView {
    pub fn active(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| !p.reached)
    }

    pub fn active_except(&self, id: RoverId) -> Vec<RoverId> {
        self.active().filter(|p| p.id != id).map(|p| p.id).collect()
    }

    /// Active rovers farther from the target than `sender`.
    pub fn farther_than(&self, sender: &Rover) -> Vec<RoverId> {
        self.active()
            .filter(|p| p.id != sender.id && p.distance_to_target > sender.distance_to_target)
            .map(|p| p.id)
            .collect()
    }

    pub fn mean_active_distance(&self) -> Option<f64> {
        let (sum, count) = self
            .active()
            .fold((0.0, 0usize), |(sum, count), p| (sum + p.distance_to_target, count + 1));
        (count > 0).then(|| sum / count as f64)
    }
}

/// One message: a shape going from one rover to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatch {
    pub sender: RoverId,
    pub receiver: RoverId,
    pub obstacle: Polygon,
}

fn fan_out(sender: RoverId, candidates: &[Polygon], receivers: &[RoverId]) -> Vec<Dispatch> {
    if receivers.is_empty() {
        return Vec::new();
    }
    candidates
        .iter()
        .flat_map(|obstacle| {
            receivers.iter().map(move |&receiver| Dispatch {
                sender,
                receiver,
                obstacle: obstacle.clone(),
            })
        })
        .collect()
}

fn send_and_remove(sender: &mut Rover, candidates: &[Polygon], receivers: &[RoverId]) -> Vec<Dispatch> {
    let dispatches = fan_out(sender.id, candidates, receivers);
    if !dispatches.is_empty() {
        for candidate in candidates {
            sender.candidates.remove(candidate);
        }
    }
    dispatches
}

fn content_filter(sender: &Rover, swarm: &SwarmView) -> Vec<Polygon> {
    let Some(mean) = swarm.mean_active_distance() else {
        return Vec::new();
    };
    sender
        .candidates
        .iter()
        .filter(|c| distance_to_polygon(c, swarm.target) < mean)
        .cloned()
        .collect()
}

fn timing_selective(sender: &mut Rover, swarm: &SwarmView, now: f64) -> Vec<Dispatch> {
    if !sender.comm_active() {
        return Vec::new();
    }
    let Some(head) = sender.candidates.front().cloned() else {
        return Vec::new();
    };
    let receivers = swarm.active_except(sender.id);
    let dispatches = fan_out(sender.id, std::slice::from_ref(&head), &receivers);
    if !dispatches.is_empty() {
        sender.candidates.pop_front();
        sender.comm_gate.close(now);
    }
    dispatches
}

fn integrated(sender: &mut Rover, swarm: &SwarmView, now: f64) -> Vec<Dispatch> {
    if !sender.comm_active() {
        return Vec::new();
    }
    let candidates = content_filter(sender, swarm);
    let receivers = swarm.farther_than(sender);
    let dispatches = send_and_remove(sender, &candidates, &receivers);
    if !dispatches.is_empty() {
        sender.comm_gate.close(now);
    }
    dispatches
}

/// Baseline uncertainty a sender attributes to `peer`.
pub fn baseline_uncertainty(sender: &Rover, peer: &Peer, swarm: &SwarmView) -> f64 {
    let diag = swarm.world_diagonal.max(f64::MIN_POSITIVE);
    let far_from_target = (peer.distance_to_target / diag).min(1.0);
    let near_sender = 1.0 - (sender.position.distance(peer.position) / diag).min(1.0);
    let unknown = if swarm.ground_truth_len == 0 {
        0.0
    } else {
        1.0 - (peer.known_obstacles as f64 / swarm.ground_truth_len as f64).min(1.0)
    };
    PLAN_WEIGHT_TARGET * far_from_target
        + PLAN_WEIGHT_PROXIMITY * near_sender
        + PLAN_WEIGHT_UNKNOWN * unknown
}

/// First horizon step whose forecast reaches the threshold.
pub fn forecast_crossing(baseline: f64) -> Option<u32> {
    (1..=PLAN_HORIZON).find(|&k| baseline * PLAN_GROWTH.powi(k as i32) >= PLAN_THRESHOLD)
}

fn plan_aware(sender: &mut Rover, swarm: &SwarmView) -> Vec<Dispatch> {
    if sender.candidates.is_empty() {
        return Vec::new();
    }
    let receivers: Vec<RoverId> = swarm
        .active()
        .filter(|p| p.id != sender.id)
        .filter(|p| forecast_crossing(baseline_uncertainty(sender, p, swarm)) == Some(1))
        .map(|p| p.id)
        .collect();
    let candidates: Vec<Polygon> = sender.candidates.iter().cloned().collect();
    let dispatches = fan_out(sender.id, &candidates, &receivers);
    if !dispatches.is_empty() {
        sender.candidates.clear();
    }
    dispatches
}

/// Stable identity of a shape: rounded area and centroid, hashed.
pub fn fingerprint(shape: &[Point]) -> String {
    let center = centroid(shape);
    let key = format!("{:.0}:{:.0}:{:.0}", polygon_area(shape), center.x, center.y);
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Usefulness of broadcasting `shape`; zero for shapes already sent.
pub fn utility_score(sender: &Rover, shape: &[Point], target: Point) -> f64 {
    if sender.sent_fingerprints.contains(&fingerprint(shape)) {
        return 0.0;
    }
    1.0 / (1.0 + distance_to_polygon(shape, target))
}

fn utility_aware(sender: &mut Rover, swarm: &SwarmView) -> Vec<Dispatch> {
    let mut scored: Vec<(f64, Polygon)> = sender
        .candidates
        .iter()
        .map(|c| (utility_score(sender, c, swarm.target), c.clone()))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    if scored.is_empty() {
        return Vec::new();
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let candidates: Vec<Polygon> = scored.into_iter().map(|(_, c)| c).collect();
    let receivers = swarm.active_except(sender.id);
    let dispatches = fan_out(sender.id, &candidates, &receivers);
    if !dispatches.is_empty() {
        for candidate in &candidates {
            sender.sent_fingerprints.insert(fingerprint(candidate));
        }
        sender.candidates.clear();
    }
    dispatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::geometry::rectangle;
    use crate::modules::navigation::Bounds;
    use crate::modules::rover::RoverParams;

    fn params() -> RoverParams {
        RoverParams {
            bounds: Bounds::new(600.0, 600.0),
            speed: 0.2,
            sensor_range: 25.0,
            clearance: 15.0,
            candidate_capacity: 3,
            clamp_merges_to_quad: false,
        }
    }

    fn rover(id: RoverId, x: f64, y: f64, distance: f64) -> Rover {
        let mut rover = Rover::new(id, Point::new(x, y), Point::new(0.0, 0.0), &params());
        rover.distance_to_target = distance;
        rover
    }

    fn view(rovers: &[&Rover]) -> SwarmView {
        SwarmView {
            peers: rovers.iter().map(|r| Peer::of(r)).collect(),
            target: Point::new(0.0, 0.0),
            ground_truth_len: 10,
            world_diagonal: Bounds::new(600.0, 600.0).diagonal(),
        }
    }

    fn receivers(dispatches: &[Dispatch]) -> Vec<RoverId> {
        let mut ids: Vec<RoverId> = dispatches.iter().map(|d| d.receiver).collect();
        ids.dedup();
        ids
    }

    #[test]
    fn labels_and_aliases_parse() {
        for policy in CommPolicy::ALL {
            assert_eq!(policy.label().parse::<CommPolicy>(), Ok(policy));
            assert_eq!(policy.alias().parse::<CommPolicy>(), Ok(policy));
        }
        assert_eq!("Full".parse::<CommPolicy>(), Ok(CommPolicy::Full));
        assert!("chatty".parse::<CommPolicy>().is_err());
    }

    #[test]
    fn integrated_is_the_default_policy() {
        assert_eq!(CommPolicy::default(), CommPolicy::Integrated);
    }

    #[test]
    fn none_never_sends() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        sender.candidates.push(rectangle(0.0, 0.0, 5.0, 5.0));
        let other = rover(2, 50.0, 50.0, 200.0);
        let swarm = view(&[&sender, &other]);

        assert!(CommPolicy::None.consider_broadcast(&mut sender, &swarm, 3.0).is_empty());
        assert_eq!(sender.candidates.len(), 1);
    }

    #[test]
    fn full_sends_everything_to_active_peers() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        sender.candidates.push(rectangle(0.0, 0.0, 5.0, 5.0));
        sender.candidates.push(rectangle(20.0, 20.0, 25.0, 25.0));
        let other = rover(2, 50.0, 50.0, 50.0);
        let mut done = rover(3, 0.0, 0.0, 0.0);
        done.state = crate::modules::rover::RoverState::Reached;
        let swarm = view(&[&sender, &other, &done]);

        let dispatches = CommPolicy::Full.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(dispatches.len(), 2);
        assert!(dispatches.iter().all(|d| d.receiver == 2 && d.sender == 1));
        assert!(sender.candidates.is_empty());
    }

    #[test]
    fn full_without_receivers_keeps_queue() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        sender.candidates.push(rectangle(0.0, 0.0, 5.0, 5.0));
        let swarm = view(&[&sender]);

        assert!(CommPolicy::Full.consider_broadcast(&mut sender, &swarm, 3.0).is_empty());
        assert_eq!(sender.candidates.len(), 1);
    }

    #[test]
    fn timing_selective_sends_head_and_closes_gate() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        let first = rectangle(0.0, 0.0, 5.0, 5.0);
        sender.candidates.push(first.clone());
        sender.candidates.push(rectangle(20.0, 20.0, 25.0, 25.0));
        let a = rover(2, 50.0, 50.0, 50.0);
        let b = rover(3, 60.0, 60.0, 300.0);
        let swarm = view(&[&sender, &a, &b]);

        let dispatches = CommPolicy::TimingSelective.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(dispatches.len(), 2);
        assert!(dispatches.iter().all(|d| d.obstacle == first));
        assert_eq!(sender.candidates.len(), 1);
        assert_eq!(sender.comm_gate.closed_at(), Some(3.0));

        // gate closed: nothing more until it reopens
        assert!(CommPolicy::TimingSelective
            .consider_broadcast(&mut sender, &swarm, 3.0)
            .is_empty());
        assert!(sender.comm_gate.reopen_if_due(4.2, 1.2));
        assert_eq!(
            CommPolicy::TimingSelective
                .consider_broadcast(&mut sender, &swarm, 3.0)
                .len(),
            2
        );
    }

    #[test]
    fn content_selective_keeps_obstacles_nearer_than_mean() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        let near = rectangle(10.0, 10.0, 20.0, 20.0);
        let far = rectangle(400.0, 400.0, 420.0, 420.0);
        sender.candidates.push(near.clone());
        sender.candidates.push(far.clone());
        let other = rover(2, 50.0, 50.0, 200.0);
        let swarm = view(&[&sender, &other]);

        let dispatches = CommPolicy::ContentSelective.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].obstacle, near);
        assert_eq!(sender.candidates.iter().collect::<Vec<_>>(), vec![&far]);
    }

    #[test]
    fn receiver_selective_targets_rovers_behind() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        sender.candidates.push(rectangle(0.0, 0.0, 5.0, 5.0));
        let ahead = rover(2, 50.0, 50.0, 50.0);
        let behind = rover(3, 60.0, 60.0, 300.0);
        let swarm = view(&[&sender, &ahead, &behind]);

        let dispatches = CommPolicy::ReceiverSelective.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(receivers(&dispatches), vec![3]);
        assert!(sender.candidates.is_empty());
    }

    #[test]
    fn integrated_needs_both_filters() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        sender.candidates.push(rectangle(10.0, 10.0, 20.0, 20.0));
        let ahead = rover(2, 50.0, 50.0, 50.0);
        let swarm = view(&[&sender, &ahead]);

        // nobody behind the sender: silent no-op, gate untouched
        assert!(CommPolicy::Integrated.consider_broadcast(&mut sender, &swarm, 3.0).is_empty());
        assert!(sender.comm_active());
        assert_eq!(sender.candidates.len(), 1);

        let behind = rover(3, 60.0, 60.0, 300.0);
        let swarm = view(&[&sender, &ahead, &behind]);
        let dispatches = CommPolicy::Integrated.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(receivers(&dispatches), vec![3]);
        assert!(!sender.comm_active());
        assert!(sender.candidates.is_empty());
    }

    #[test]
    fn plan_aware_forecast_threshold() {
        assert_eq!(forecast_crossing(0.45), Some(1));
        assert_eq!(forecast_crossing(0.6), Some(1));
        assert_eq!(forecast_crossing(0.3), Some(3));
        assert_eq!(forecast_crossing(0.1), None);
    }

    #[test]
    fn plan_aware_picks_uncertain_neighbours() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        sender.candidates.push(rectangle(0.0, 0.0, 5.0, 5.0));
        // close to the sender, far from the target, knows nothing
        let lost = rover(2, 20.0, 20.0, 800.0);
        // far from the sender, near the target, knows everything
        let mut settled = rover(3, 590.0, 590.0, 5.0);
        settled.known_obstacles = 10;
        let swarm = view(&[&sender, &lost, &settled]);

        let dispatches = CommPolicy::PlanAware.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(receivers(&dispatches), vec![2]);
        assert!(sender.candidates.is_empty());
    }

    #[test]
    fn utility_aware_orders_by_score_and_skips_duplicates() {
        let mut sender = rover(1, 10.0, 10.0, 100.0);
        let far = rectangle(300.0, 300.0, 310.0, 310.0);
        let near = rectangle(5.0, 5.0, 10.0, 10.0);
        sender.candidates.push(far.clone());
        sender.candidates.push(near.clone());
        let other = rover(2, 50.0, 50.0, 200.0);
        let swarm = view(&[&sender, &other]);

        let dispatches = CommPolicy::UtilityAware.consider_broadcast(&mut sender, &swarm, 3.0);
        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].obstacle, near);
        assert_eq!(dispatches[1].obstacle, far);
        assert!(sender.candidates.is_empty());
        assert_eq!(utility_score(&sender, &near, swarm.target), 0.0);

        sender.candidates.push(near.clone());
        assert!(CommPolicy::UtilityAware
            .consider_broadcast(&mut sender, &swarm, 3.0)
            .is_empty());
    }

    #[test]
    fn fingerprint_ignores_sub_unit_noise() {
        let a = rectangle(0.0, 0.0, 10.0, 10.0);
        let b = rectangle(0.0001, 0.0, 10.0001, 10.0);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&rectangle(50.0, 50.0, 60.0, 60.0)));
    }
}
