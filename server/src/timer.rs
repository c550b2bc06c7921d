//! Cancellable timers and the per-round countdown
//!
//! Timers never call back into the session directly. A fired timer becomes a
//! [`TimerFired`] event that the coordinator loop feeds to the session like
//! any other input, so timer work is serialized with player messages. Every
//! scheduled timer has a [`TimerId`]; whoever owns the id can cancel it, and
//! the session ignores fired events whose id it no longer holds.

use log::trace;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Pre-game delay once enough players have joined
    Lobby,
    /// One countdown step of the running round
    RoundTick,
    /// Pause between results and the next round
    Intermission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub kind: TimerKind,
}

pub trait Scheduler {
    /// Arranges for a `TimerFired` event after `delay`.
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerId;

    /// Cancels a pending timer. Unknown or already fired ids are ignored.
    fn cancel(&mut self, id: TimerId);
}

/// Scheduler backed by tokio tasks that deliver into the coordinator's
/// timer channel.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerFired>,
    next_id: u64,
    tasks: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx,
            next_id: 1,
            tasks: HashMap::new(),
        }
    }

    /// Number of timers that have not fired or been cancelled yet
    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.tasks.retain(|_, task| !task.is_finished());

        let id = TimerId(self.next_id);
        self.next_id += 1;

        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop is gone during shutdown; nothing left to notify
            let _ = tx.send(TimerFired { id, kind });
        });

        trace!("Scheduled {:?} timer {} in {:?}", kind, id.0, delay);
        self.tasks.insert(id, task);
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
            trace!("Cancelled timer {}", id.0);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}

/// Scheduler that only records requests. Timers fire when the owner says so.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Vec<(TimerId, Duration, TimerKind)>,
    cancelled: Vec<TimerId>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[(TimerId, Duration, TimerKind)] {
        &self.pending
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.iter().any(|(_, _, k)| *k == kind)
    }

    /// Removes the oldest pending timer of `kind` and returns its event.
    pub fn fire(&mut self, kind: TimerKind) -> Option<TimerFired> {
        let index = self.pending.iter().position(|(_, _, k)| *k == kind)?;
        let (id, _, kind) = self.pending.remove(index);
        Some(TimerFired { id, kind })
    }

    pub fn cancelled(&self) -> &[TimerId] {
        &self.cancelled
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.push((id, delay, kind));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        let before = self.pending.len();
        self.pending.retain(|(pending, _, _)| *pending != id);
        if self.pending.len() != before {
            self.cancelled.push(id);
        }
    }
}

/// Result of feeding a tick to the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { time_left: u32 },
    Expired,
}

/// Countdown for one round. Holds the handle of its next tick.
#[derive(Debug)]
pub struct RoundTimer {
    tick_interval: Duration,
    time_left: u32,
    handle: Option<TimerId>,
}

impl RoundTimer {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            time_left: 0,
            handle: None,
        }
    }

    /// Starts a fresh countdown, cancelling any previous one.
    pub fn start<S: Scheduler + ?Sized>(&mut self, seconds: u32, scheduler: &mut S) {
        self.cancel(scheduler);
        self.time_left = seconds;
        self.handle = Some(scheduler.schedule(self.tick_interval, TimerKind::RoundTick));
    }

    /// Applies a fired tick. Returns `None` for a tick this countdown does
    /// not own (cancelled or from an earlier round).
    pub fn on_tick<S: Scheduler + ?Sized>(&mut self, id: TimerId, scheduler: &mut S) -> Option<Tick> {
        if self.handle != Some(id) {
            return None;
        }
        self.handle = None;
        self.time_left = self.time_left.saturating_sub(1);

        if self.time_left == 0 {
            return Some(Tick::Expired);
        }

        self.handle = Some(scheduler.schedule(self.tick_interval, TimerKind::RoundTick));
        Some(Tick::Running {
            time_left: self.time_left,
        })
    }

    pub fn cancel<S: Scheduler + ?Sized>(&mut self, scheduler: &mut S) {
        if let Some(id) = self.handle.take() {
            scheduler.cancel(id);
        }
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}
