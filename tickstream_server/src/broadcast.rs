//! Snapshot broadcaster.
//!
//! Counts ticks and, on every Nth one, sends the full entity list to every
//! session. The list is shared; each recipient gets its own `ackSeq`.
//! Sends use `try_send`, so a slow or dead recipient costs one dropped
//! frame and never delays the tick.

use tickstream_shared::{
    entity::EntityState,
    net::MAX_SERVER_FRAME_LEN,
    protocol::encode_snapshot,
};
use tracing::{debug, trace, warn};

use crate::registry::{SendFailure, World};

/// Delivery counters for one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub tick: u64,
    pub entities: usize,
    pub delivered: usize,
    /// Recipients whose queue was full.
    pub dropped: usize,
    /// Recipients whose writer had already gone away.
    pub closed: usize,
    /// Recipients skipped because the encoded frame was too large to send.
    pub oversized: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotBroadcaster {
    every: u64,
    ticks: u64,
    sent: u64,
}

impl SnapshotBroadcaster {
    /// `every` is the number of ticks per snapshot (tick rate / snapshot rate).
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            ticks: 0,
            sent: 0,
        }
    }

    /// Number of broadcasts performed so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Records the end of a tick and broadcasts if this is the Nth one.
    /// Must be called after the simulation step for that tick.
    pub fn on_tick(&mut self, world: &World, server_time: i64) -> Option<BroadcastReport> {
        self.ticks += 1;
        if self.ticks % self.every != 0 {
            return None;
        }
        self.sent += 1;
        Some(self.broadcast(world, server_time))
    }

    fn broadcast(&self, world: &World, server_time: i64) -> BroadcastReport {
        let entities: Vec<EntityState> = world.entities().cloned().collect();
        let mut report = BroadcastReport {
            tick: self.ticks,
            entities: entities.len(),
            ..Default::default()
        };

        for session in world.sessions() {
            let frame = match encode_snapshot(server_time, session.last_acked_seq, &entities) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(entity = %session.id, error = %e, "Snapshot encode failed");
                    continue;
                }
            };
            if frame.len() > MAX_SERVER_FRAME_LEN {
                if report.oversized == 0 {
                    warn!(
                        bytes = frame.len(),
                        limit = MAX_SERVER_FRAME_LEN,
                        entities = report.entities,
                        "Snapshot exceeds frame limit, not sent"
                    );
                }
                report.oversized += 1;
                continue;
            }
            match session.outbound.try_send(frame) {
                Ok(()) => report.delivered += 1,
                Err(SendFailure::Full) => {
                    debug!(entity = %session.id, "Outbound queue full, snapshot dropped");
                    report.dropped += 1;
                }
                Err(SendFailure::Closed) => {
                    debug!(entity = %session.id, "Outbound closed, snapshot dropped");
                    report.closed += 1;
                }
            }
        }

        trace!(
            tick = report.tick,
            entities = report.entities,
            delivered = report.delivered,
            dropped = report.dropped,
            oversized = report.oversized,
            "Snapshot broadcast"
        );
        report
    }
}
