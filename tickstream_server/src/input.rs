//! Per-session input queue.
//!
//! The connection task is the only producer and the tick is the only
//! consumer. Pushing never blocks; draining never waits for more input.

use tickstream_shared::protocol::{Command, InputBatch};
use tokio::sync::mpsc;

/// Creates the producer/consumer pair for one session.
pub fn input_channel() -> (InputSender, InputQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InputSender { tx }, InputQueue { rx })
}

/// Receive-path handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: mpsc::UnboundedSender<InputBatch>,
}

impl InputSender {
    /// Appends a batch in arrival order. Returns `false` once the owning
    /// session has been removed.
    pub fn push(&self, batch: InputBatch) -> bool {
        self.tx.send(batch).is_ok()
    }
}

/// Outcome of draining one session's queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub batches: usize,
    pub commands: usize,
}

/// Tick-side handle, owned by the session.
#[derive(Debug)]
pub struct InputQueue {
    rx: mpsc::UnboundedReceiver<InputBatch>,
}

impl InputQueue {
    /// Drains everything queued so far in arrival order, feeding each
    /// command to `apply` in list order. After each batch `last_acked`
    /// becomes `max(last_acked, batch.sequence)`, so late or reordered
    /// batches never move it backwards.
    pub fn drain(&mut self, last_acked: &mut u64, mut apply: impl FnMut(&Command)) -> DrainStats {
        let mut stats = DrainStats::default();
        while let Ok(batch) = self.rx.try_recv() {
            for cmd in &batch.commands {
                apply(cmd);
            }
            *last_acked = (*last_acked).max(batch.sequence);
            stats.batches += 1;
            stats.commands += batch.commands.len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(sequence: u64, commands: Vec<Command>) -> InputBatch {
        InputBatch { sequence, commands }
    }

    #[test]
    fn drains_in_arrival_and_list_order() {
        let (tx, mut queue) = input_channel();
        tx.push(batch(1, vec![Command::MoveTo { x: 1.0, y: 1.0 }, Command::Stop]));
        tx.push(batch(2, vec![Command::MoveTo { x: 2.0, y: 2.0 }]));

        let mut seen = Vec::new();
        let mut ack = 0;
        let stats = queue.drain(&mut ack, |cmd| seen.push(*cmd));

        assert_eq!(
            seen,
            vec![
                Command::MoveTo { x: 1.0, y: 1.0 },
                Command::Stop,
                Command::MoveTo { x: 2.0, y: 2.0 },
            ]
        );
        assert_eq!(ack, 2);
        assert_eq!(
            stats,
            DrainStats {
                batches: 2,
                commands: 3
            }
        );
    }

    #[test]
    fn ack_is_max_regardless_of_arrival_order() {
        let orders: [&[u64]; 4] = [&[1, 2, 3, 9], &[9, 3, 2, 1], &[3, 9, 1, 2], &[2, 2, 9, 0]];
        for order in orders {
            let (tx, mut queue) = input_channel();
            for &seq in order {
                tx.push(batch(seq, vec![]));
            }
            let mut ack = 0;
            queue.drain(&mut ack, |_| {});
            assert_eq!(ack, 9, "order {order:?}");
        }
    }

    #[test]
    fn stale_batch_in_later_tick_keeps_ack() {
        let (tx, mut queue) = input_channel();
        let mut ack = 0;

        tx.push(batch(5, vec![]));
        queue.drain(&mut ack, |_| {});
        assert_eq!(ack, 5);

        tx.push(batch(3, vec![Command::Stop]));
        let mut applied = 0;
        queue.drain(&mut ack, |_| applied += 1);
        assert_eq!(ack, 5);
        assert_eq!(applied, 1, "stale batches are still applied");
    }

    #[test]
    fn empty_queue_drains_nothing() {
        let (_tx, mut queue) = input_channel();
        let mut ack = 4;
        assert_eq!(queue.drain(&mut ack, |_| {}), DrainStats::default());
        assert_eq!(ack, 4);
    }

    #[test]
    fn push_fails_after_queue_dropped() {
        let (tx, queue) = input_channel();
        drop(queue);
        assert!(!tx.push(batch(1, vec![])));
    }
}
