use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::modules::comms::Dispatch;

#[derive(Clone, Debug)]
struct InFlight {
    due: f64,
    seq: u64,
    dispatch: Dispatch,
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlight {
    // Earliest due first, then send order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// What happened to a message whose delay elapsed.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Delivered(Dispatch),
    Lost(Dispatch),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub in_flight: u64,
}

/// Shared radio medium: every message is delayed, and may be dropped.
#[derive(Debug)]
pub struct Channel {
    loss_rate: f64,
    delay_ms: RangeInclusive<u64>,
    rng: StdRng,
    pending: BinaryHeap<InFlight>,
    next_seq: u64,
    sent: u64,
    delivered: u64,
    lost: u64,
}

impl Channel {
    pub fn new(loss_rate: f64, delay_ms: RangeInclusive<u64>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            loss_rate: loss_rate.clamp(0.0, 1.0),
            delay_ms,
            rng,
            pending: BinaryHeap::new(),
            next_seq: 0,
            sent: 0,
            delivered: 0,
            lost: 0,
        }
    }

    /// Queues `dispatch`; returns the simulated time it becomes due.
    pub fn dispatch(&mut self, dispatch: Dispatch, now: f64) -> f64 {
        let delay = self.rng.gen_range(self.delay_ms.clone()) as f64 / 1000.0;
        let due = now + delay;
        self.pending.push(InFlight {
            due,
            seq: self.next_seq,
            dispatch,
        });
        self.next_seq += 1;
        self.sent += 1;
        due
    }

    /// Resolves every message due at or before `now`, in due order.
    pub fn take_due(&mut self, now: f64) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        while self.pending.peek().is_some_and(|m| m.due <= now) {
            let Some(message) = self.pending.pop() else {
                break;
            };
            if self.drop_message() {
                self.lost += 1;
                outcomes.push(Outcome::Lost(message.dispatch));
            } else {
                self.delivered += 1;
                outcomes.push(Outcome::Delivered(message.dispatch));
            }
        }
        outcomes
    }

    fn drop_message(&mut self) -> bool {
        if self.loss_rate <= 0.0 {
            false
        } else if self.loss_rate >= 1.0 {
            true
        } else {
            self.rng.gen_bool(self.loss_rate)
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            sent: self.sent,
            delivered: self.delivered,
            lost: self.lost,
            in_flight: self.pending.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::geometry::rectangle;

    fn message(receiver: u64) -> Dispatch {
        Dispatch {
            sender: 0,
            receiver,
            obstacle: rectangle(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn lossless_channel_delivers_everything() {
        let mut channel = Channel::new(0.0, 50..=100, Some(7));
        for i in 0..100 {
            channel.dispatch(message(i), 0.0);
        }
        let outcomes = channel.take_due(1.0);
        assert_eq!(outcomes.len(), 100);
        assert!(outcomes.iter().all(|o| matches!(o, Outcome::Delivered(_))));
        assert_eq!(
            channel.stats(),
            ChannelStats {
                sent: 100,
                delivered: 100,
                lost: 0,
                in_flight: 0
            }
        );
    }

    #[test]
    fn total_loss_delivers_nothing() {
        let mut channel = Channel::new(1.0, 50..=100, Some(7));
        for i in 0..50 {
            channel.dispatch(message(i), 0.0);
        }
        let outcomes = channel.take_due(1.0);
        assert_eq!(outcomes.len(), 50);
        assert!(outcomes.iter().all(|o| matches!(o, Outcome::Lost(_))));
        assert_eq!(channel.stats().delivered, 0);
    }

    #[test]
    fn delay_stays_in_range_and_nothing_arrives_early() {
        let mut channel = Channel::new(0.0, 50..=100, Some(11));
        for i in 0..200 {
            let due = channel.dispatch(message(i), 2.0);
            assert!((2.05 - 1e-9..=2.1 + 1e-9).contains(&due));
        }
        assert!(channel.take_due(2.049).is_empty());
        assert_eq!(channel.in_flight(), 200);
        assert_eq!(channel.take_due(2.1 + 1e-9).len(), 200);
    }

    #[test]
    fn messages_resolve_in_due_order() {
        let mut channel = Channel::new(0.0, 50..=50, Some(1));
        channel.dispatch(message(1), 0.5);
        channel.dispatch(message(2), 0.0);
        channel.dispatch(message(3), 0.0);
        let order: Vec<u64> = channel
            .take_due(1.0)
            .into_iter()
            .map(|o| match o {
                Outcome::Delivered(d) | Outcome::Lost(d) => d.receiver,
            })
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn partial_loss_is_seeded() {
        let run = || {
            let mut channel = Channel::new(0.5, 50..=100, Some(42));
            for i in 0..100 {
                channel.dispatch(message(i), 0.0);
            }
            channel.take_due(1.0);
            channel.stats()
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.lost > 0 && first.delivered > 0);
    }
}
