//! Call duration timer
//!
//! The only long-lived background activity. A generation counter shared
//! under a mutex with the tick task guarantees that once `stop()` returns
//! no tick from the cancelled run can publish a value.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    started_at: Option<Instant>,
}

/// Read-only view of the timer, cheap to clone
#[derive(Debug, Clone)]
pub struct ElapsedProbe {
    state: Arc<Mutex<TimerState>>,
}

impl ElapsedProbe {
    /// Whole seconds since the timer started, zero if stopped
    pub fn elapsed_seconds(&self) -> u64 {
        self.state
            .lock()
            .started_at
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().started_at.is_some()
    }
}

/// Elapsed-seconds timer for a connected call
#[derive(Debug)]
pub struct DurationTimer {
    state: Arc<Mutex<TimerState>>,
    tick: Duration,
    elapsed_tx: Arc<watch::Sender<u64>>,
    task: Option<JoinHandle<()>>,
}

impl DurationTimer {
    pub fn new(tick: Duration) -> Self {
        let (elapsed_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(TimerState::default())),
            tick,
            elapsed_tx: Arc::new(elapsed_tx),
            task: None,
        }
    }

    /// Restart from zero. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();

        let started_at = Instant::now();
        let generation = {
            let mut state = self.state.lock();
            state.started_at = Some(started_at);
            state.generation
        };

        let state = self.state.clone();
        let elapsed_tx = self.elapsed_tx.clone();
        let tick = self.tick;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started_at + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let state = state.lock();
                if state.generation != generation {
                    break;
                }
                elapsed_tx.send_replace(started_at.elapsed().as_secs());
            }
        }));
    }

    /// Cancel and reset to zero. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut state = self.state.lock();
            state.generation = state.generation.wrapping_add(1);
            state.started_at = None;
            self.elapsed_tx.send_replace(0);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.probe().elapsed_seconds()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn probe(&self) -> ElapsedProbe {
        ElapsedProbe {
            state: self.state.clone(),
        }
    }

    /// Receive one update per tick while running, and a 0 on stop
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed_tx.subscribe()
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Render seconds as `MM:SS`; minutes keep counting past 59
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
