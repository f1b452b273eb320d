//! Sequence-ordered reassembly with backpressure
//!
//! While the downstream keeps up, packets pass straight through in arrival
//! order. Once it pushes back, packets are parked in a min-heap keyed on the
//! RTP sequence number and released in ascending order when the downstream
//! asks for more.
//!
//! Sequence numbers compare as plain `u16` values. A buffering episode that
//! straddles the 65535 -> 0 wrap releases the post-wrap packets first.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use bytes::Bytes;

/// A pipeline stage that accepts chunks
pub trait PacketSink {
    /// Hand a chunk downstream
    ///
    /// The chunk is always taken. The return value says whether the sink
    /// wants more right now; `false` is backpressure.
    fn push(&mut self, chunk: Bytes) -> bool;
}

/// Flow mode of a [`ReorderBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMode {
    /// Forward on arrival
    Flowing,
    /// Queue by sequence number until resumed
    Buffering,
}

struct Pending {
    sequence: u16,
    arrival: u64,
    chunk: Bytes,
}

impl Pending {
    fn key(&self) -> (u16, u64) {
        (self.sequence, self.arrival)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Flow-controlled reorder buffer
pub struct ReorderBuffer {
    mode: FlowMode,
    queue: BinaryHeap<Reverse<Pending>>,
    arrivals: u64,
}

impl ReorderBuffer {
    /// Create an empty buffer in `Flowing` mode
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: FlowMode::Flowing,
            queue: BinaryHeap::new(),
            arrivals: 0,
        }
    }

    /// Current flow mode
    #[must_use]
    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    /// Packets waiting in the queue
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Accept a packet from the network side
    pub fn add<S: PacketSink + ?Sized>(&mut self, chunk: Bytes, sequence: u16, sink: &mut S) {
        match self.mode {
            FlowMode::Flowing => {
                if !sink.push(chunk) {
                    tracing::trace!(sequence, "Downstream full, buffering");
                    self.mode = FlowMode::Buffering;
                }
            }
            FlowMode::Buffering => {
                let arrival = self.arrivals;
                self.arrivals += 1;
                self.queue.push(Reverse(Pending {
                    sequence,
                    arrival,
                    chunk,
                }));
            }
        }
    }

    /// Downstream is ready again: drain in sequence order until empty or
    /// until the sink pushes back
    pub fn resume<S: PacketSink + ?Sized>(&mut self, sink: &mut S) {
        self.mode = FlowMode::Flowing;

        while let Some(Reverse(pending)) = self.queue.pop() {
            if !sink.push(pending.chunk) {
                tracing::trace!(
                    sequence = pending.sequence,
                    remaining = self.queue.len(),
                    "Downstream full mid-drain"
                );
                self.mode = FlowMode::Buffering;
                break;
            }
        }
    }

    /// Drop every queued packet, returning how many were dropped
    ///
    /// The flow mode is left alone; a buffering sink still needs to signal
    /// readiness.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReorderBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReorderBuffer")
            .field("mode", &self.mode)
            .field("queued", &self.queue.len())
            .finish()
    }
}
