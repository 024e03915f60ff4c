//! Clock and timer queue for the single-threaded event loop.
//!
//! There are no ambient timers: every pending timer is a `TimerId` owned by
//! the component that armed it, and that component cancels it when it is torn
//! down.

use chrono::{Local, NaiveDateTime};
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::record::SessionId;

/// Time source for the monitor.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Local wall-clock time, used for artifact filenames.
    fn local_time(&self) -> NaiveDateTime;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn local_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Settable clock shared between a test (or simulation) and the monitor.
///
/// Clones observe the same time.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now_ms: Rc<Cell<u64>>,
    wall_origin: NaiveDateTime,
}

impl ManualClock {
    pub fn new(wall_origin: NaiveDateTime) -> Self {
        Self {
            now_ms: Rc::new(Cell::new(0)),
            wall_origin,
        }
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.set(now_ms);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.set(self.now_ms.get() + by.as_millis() as u64);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn local_time(&self) -> NaiveDateTime {
        self.wall_origin + chrono::Duration::milliseconds(self.now_ms.get() as i64)
    }
}

/// What a timer does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wakeup {
    /// Next detection-loop tick.
    Tick,
    /// Recording time limit for the given session.
    AutoStop(SessionId),
    /// Next camera frame for the given session's recording.
    Capture(SessionId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Timer queue ordered by deadline, then by arming order.
#[derive(Default)]
pub struct Scheduler {
    next_id: u64,
    queue: BTreeMap<(u64, u64), Wakeup>,
    deadlines: HashMap<u64, u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, deadline_ms: u64, wakeup: Wakeup) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.insert((deadline_ms, id), wakeup);
        self.deadlines.insert(id, deadline_ms);
        TimerId(id)
    }

    /// Cancel a pending timer. Returns false when it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, timer: TimerId) -> bool {
        match self.deadlines.remove(&timer.0) {
            Some(deadline) => self.queue.remove(&(deadline, timer.0)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, timer: TimerId) -> bool {
        self.deadlines.contains_key(&timer.0)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, Wakeup)> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if deadline > now_ms {
            return None;
        }
        let wakeup = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        Some((TimerId(id), wakeup))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
