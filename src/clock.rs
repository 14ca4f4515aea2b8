//! Time source for polling budgets, cooldowns and call timing.
//!
//! Production code runs on [`TokioClock`]. Tests inject [`ManualClock`], whose
//! `sleep` advances virtual time instantly so a one-hour polling budget runs
//! in microseconds.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::time::Instant;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created
    fn now(&self) -> Duration;
    async fn sleep(&self, duration: Duration);

    fn since(&self, start: Duration) -> Duration {
        self.now().saturating_sub(start)
    }
}

#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Virtual clock: time only moves when someone sleeps or calls `advance`.
///
/// Every spawned task runs on its own timeline, forked from the root timeline
/// when the task first reads the clock, so sleeps in concurrent calls overlap
/// the way they would in real time. Code outside a spawned task shares the
/// root timeline, which catches up with the furthest task whenever it is read.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<Timeline>>,
}

#[derive(Debug, Default)]
struct Timeline {
    root: Duration,
    tasks: HashMap<task::Id, Duration>,
    slept: Vec<Duration>,
}

impl Timeline {
    fn latest(&self) -> Duration {
        self.tasks.values().copied().fold(self.root, Duration::max)
    }

    fn now(&mut self) -> Duration {
        match task::try_id() {
            Some(id) => *self.tasks.entry(id).or_insert(self.root),
            None => {
                self.root = self.latest();
                self.root
            }
        }
    }

    fn advance(&mut self, by: Duration) {
        match task::try_id() {
            Some(id) => *self.tasks.entry(id).or_insert(self.root) += by,
            None => self.root = self.latest() + by,
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.state.lock().advance(by);
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().slept.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().slept.iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().now()
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.slept.push(duration);
            state.advance(duration);
        }
        tokio::task::yield_now().await;
    }
}
