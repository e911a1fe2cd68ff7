//! Single-task timer driver: a min-heap of armed checks keyed by fire time.
//!
//! One driver serves every tracked leaf, so the number of OS timers stays at
//! one regardless of how many leaves are pending.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::identity::LeafId;

#[derive(Debug)]
pub(crate) enum TimerCommand {
    Arm { leaf: LeafId, at: Instant },
    Shutdown,
}

#[derive(Debug)]
struct TimerEntry {
    at: Instant,
    seq: u64,
    leaf: LeafId,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the earliest entry; seq keeps arm order on ties.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub(crate) struct DeadlineQueue {
    heap: BinaryHeap<TimerEntry>,
    seq: u64,
}

impl DeadlineQueue {
    pub(crate) fn push(&mut self, leaf: LeafId, at: Instant) {
        self.seq += 1;
        self.heap.push(TimerEntry {
            at,
            seq: self.seq,
            leaf,
        });
    }

    pub(crate) fn next_at(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.at)
    }

    /// Remove and return every leaf whose fire time is at or before `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<LeafId> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|entry| entry.at <= now) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.leaf);
            }
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

const IDLE_PARK: Duration = Duration::from_secs(24 * 60 * 60);

/// Run until shutdown, every sender is dropped, or `on_due` breaks.
pub(crate) async fn drive<F>(mut commands: mpsc::UnboundedReceiver<TimerCommand>, mut on_due: F)
where
    F: FnMut(LeafId) -> ControlFlow<()>,
{
    let mut queue = DeadlineQueue::default();
    loop {
        let next = queue.next_at();
        let wake_at = next.unwrap_or_else(|| Instant::now() + IDLE_PARK);
        tokio::select! {
            command = commands.recv() => match command {
                Some(TimerCommand::Arm { leaf, at }) => queue.push(leaf, at),
                Some(TimerCommand::Shutdown) | None => break,
            },
            _ = sleep_until(wake_at), if next.is_some() => {
                for leaf in queue.pop_due(Instant::now()) {
                    if on_due(leaf).is_break() {
                        tracing::debug!(
                            pending = queue.len(),
                            "timer driver stopping: owner dropped"
                        );
                        return;
                    }
                }
            }
        }
    }
    tracing::debug!(pending = queue.len(), "timer driver stopped");
}
