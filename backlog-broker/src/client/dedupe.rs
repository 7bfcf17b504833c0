//! Bounded per-type window of acknowledged timestamps.
//!
//! The deployment replays everything it has not seen an ack for. When an ack
//! is lost on a dropped connection the replay repeats data that was already
//! published; the window recognizes those repeats.

use crate::message::MessageType;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Default)]
struct TypeWindow {
    order: VecDeque<i64>,
    seen: HashSet<i64>,
}

pub(crate) struct DedupeWindow {
    capacity: usize,
    per_type: HashMap<MessageType, TypeWindow>,
}

impl DedupeWindow {
    /// A capacity of zero disables deduplication.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            per_type: HashMap::new(),
        }
    }

    pub(crate) fn is_duplicate(&self, message_type: MessageType, timestamp: i64) -> bool {
        self.per_type
            .get(&message_type)
            .is_some_and(|window| window.seen.contains(&timestamp))
    }

    pub(crate) fn record(&mut self, message_type: MessageType, timestamp: i64) {
        if self.capacity == 0 {
            return;
        }
        let window = self.per_type.entry(message_type).or_default();
        if !window.seen.insert(timestamp) {
            return;
        }
        window.order.push_back(timestamp);
        while window.order.len() > self.capacity {
            if let Some(evicted) = window.order.pop_front() {
                window.seen.remove(&evicted);
            }
        }
    }
}
