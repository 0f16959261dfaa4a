//! Out-of-order message buffering for host applications.
//!
//! MQTT preserves per-connection ordering, but a host fed by several brokers
//! or a flaky network can still observe Sparkplug messages out of sequence.
//! The reorder manager holds a small per-edge-node buffer of messages that
//! arrived ahead of the next expected `seq` and releases contiguous runs as
//! the missing messages show up. Time is injected by the caller so the expiry
//! policy is deterministic under test.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::topic::MessageType;

/// Configuration for the reorder manager.
#[derive(Debug, Clone, Copy)]
pub struct ReorderConfig {
    /// How many sequence numbers ahead of the next expected one a message may
    /// be and still be buffered. Anything further out raises a gap.
    pub window: u8,
    /// How long a buffered message may wait for its predecessors before the
    /// unresolved gap is reported.
    pub timeout: Duration,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            window: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Outcome of ingesting one message.
#[derive(Debug, PartialEq)]
pub enum Ingest<T> {
    /// The message (plus any contiguous buffered run behind it) is ready to
    /// process, in order.
    Dispatch(Vec<T>),
    /// The message arrived ahead of sequence and was buffered.
    Buffered,
    /// The message is outside the reorder window, a duplicate from the past,
    /// or the buffer is exhausted.
    Gap {
        /// The next expected sequence number.
        expected: u8,
        /// The sequence number that arrived.
        got: u8,
    },
}

/// A gap reported because buffered messages waited too long.
#[derive(Debug, PartialEq)]
pub struct ExpiredGap<K> {
    /// The edge node key the gap belongs to.
    pub key: K,
    /// The sequence number that never arrived.
    pub expected: u8,
    /// The oldest buffered sequence number that was waiting on it.
    pub got: u8,
}

struct NodeBuffer<T> {
    next_expected: u8,
    buffered: HashMap<u8, (T, Instant)>,
}

/// Per-edge-node sequence reordering.
///
/// `K` identifies an edge node (the host uses `(server, edge descriptor)`),
/// `T` is whatever the caller wants released in order.
pub struct SequenceReorderManager<K, T> {
    config: ReorderConfig,
    nodes: HashMap<K, NodeBuffer<T>>,
}

impl<K: Eq + Hash + Clone, T> SequenceReorderManager<K, T> {
    /// Creates a manager.
    pub fn new(config: ReorderConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
        }
    }

    /// Ingests one message.
    ///
    /// An NBIRTH resets the node's expected sequence to `(seq + 1) mod 256`
    /// and flushes buffered entries that the reset leaves in the past.
    /// Messages without a `seq`, and messages for nodes that have not yet
    /// seen an NBIRTH, pass straight through.
    pub fn ingest(
        &mut self,
        key: &K,
        message_type: MessageType,
        seq: Option<u64>,
        message: T,
        now: Instant,
    ) -> Ingest<T> {
        let Some(seq) = seq.and_then(|s| u8::try_from(s).ok()) else {
            return Ingest::Dispatch(vec![message]);
        };

        if message_type == MessageType::NBirth {
            let node = self.nodes.entry(key.clone()).or_insert_with(|| NodeBuffer {
                next_expected: 0,
                buffered: HashMap::new(),
            });
            node.next_expected = seq.wrapping_add(1);
            let window = self.config.window;
            let next = node.next_expected;
            node.buffered
                .retain(|buffered_seq, _| in_window(next, *buffered_seq, window));
            debug!(seq, "NBIRTH reset reorder state");
            let mut run = vec![message];
            drain_contiguous(node, &mut run);
            return Ingest::Dispatch(run);
        }

        let Some(node) = self.nodes.get_mut(key) else {
            // No birth seen yet; let the session tracker judge the sequence.
            return Ingest::Dispatch(vec![message]);
        };

        if seq == node.next_expected {
            node.next_expected = node.next_expected.wrapping_add(1);
            let mut run = vec![message];
            drain_contiguous(node, &mut run);
            trace!(seq, released = run.len(), "in-order dispatch");
            return Ingest::Dispatch(run);
        }

        if in_window(node.next_expected, seq, self.config.window) {
            if node.buffered.len() >= usize::from(self.config.window) {
                return Ingest::Gap {
                    expected: node.next_expected,
                    got: seq,
                };
            }
            debug!(
                seq,
                expected = node.next_expected,
                "buffering out-of-order message"
            );
            node.buffered.insert(seq, (message, now));
            return Ingest::Buffered;
        }

        Ingest::Gap {
            expected: node.next_expected,
            got: seq,
        }
    }

    /// Reports gaps for buffered messages that have waited longer than the
    /// configured timeout, dropping their buffers.
    pub fn expire(&mut self, now: Instant) -> Vec<ExpiredGap<K>> {
        let timeout = self.config.timeout;
        let mut gaps = Vec::new();
        for (key, node) in &mut self.nodes {
            let timed_out = node
                .buffered
                .values()
                .any(|(_, arrived)| now.duration_since(*arrived) >= timeout);
            if !timed_out {
                continue;
            }
            // The oldest unresolved gap is the lowest buffered distance from
            // the next expected sequence number.
            if let Some(oldest) = node
                .buffered
                .keys()
                .copied()
                .min_by_key(|seq| seq.wrapping_sub(node.next_expected))
            {
                gaps.push(ExpiredGap {
                    key: key.clone(),
                    expected: node.next_expected,
                    got: oldest,
                });
            }
            node.buffered.clear();
        }
        gaps
    }

    /// Number of messages currently buffered for a key.
    pub fn buffered_len(&self, key: &K) -> usize {
        self.nodes.get(key).map_or(0, |n| n.buffered.len())
    }

    /// Drops all state for a key.
    pub fn forget(&mut self, key: &K) {
        self.nodes.remove(key);
    }
}

fn in_window(next_expected: u8, seq: u8, window: u8) -> bool {
    let distance = seq.wrapping_sub(next_expected);
    distance > 0 && distance <= window
}

fn drain_contiguous<T>(node: &mut NodeBuffer<T>, run: &mut Vec<T>) {
    while let Some((message, _)) = node.buffered.remove(&node.next_expected) {
        run.push(message);
        node.next_expected = node.next_expected.wrapping_add(1);
    }
}
