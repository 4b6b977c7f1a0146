//! Fixed-period tick scheduler.
//!
//! One background task drives a [`TickHandler`]: the first tick fires as soon
//! as the scheduler starts, then once per period. Ticks run sequentially on
//! that task, so they never overlap; periods missed while a tick was running
//! are skipped rather than replayed.
//!
//! # Lifecycle
//!
//! - [`Scheduler::start`] spawns the loop; calling it while running is a no-op.
//! - [`Scheduler::stop`] signals the loop and waits for it to exit. A tick in
//!   flight completes first; no tick starts after `stop` returns.
//! - Both hold the lifecycle lock for their whole duration, so a `start`
//!   issued while a `stop` is draining waits for the old loop to exit.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Errors raised when building a scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The tick period must be positive.
    #[error("tick interval must be positive")]
    ZeroInterval,
}

/// Work performed on every tick.
pub trait TickHandler: Send + Sync + 'static {
    /// Run tick number `tick` (starting at 1) for wall-clock time `now`.
    fn on_tick(&self, tick: u64, now: DateTime<Utc>) -> impl Future<Output = ()> + Send;
}

#[derive(Debug)]
struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives a [`TickHandler`] at a fixed period.
#[derive(Debug)]
pub struct Scheduler<H> {
    handler: Arc<H>,
    period: Duration,
    ticks: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl<H: TickHandler> Scheduler<H> {
    /// Create a stopped scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ZeroInterval`] for a zero `period`.
    pub fn new(handler: Arc<H>, period: Duration) -> Result<Self, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        Ok(Self {
            handler,
            period,
            ticks: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        })
    }

    /// The tick period.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks started so far, across restarts.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Whether the tick loop is currently running.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Start the tick loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.handler),
            self.period,
            Arc::clone(&self.ticks),
            stop_rx,
        ));
        *running = Some(Running { stop, task });

        info!(period_ms = self.period.as_millis(), "Scheduler started");
        true
    }

    /// Stop the tick loop and wait for it to exit. Returns `false` if it was
    /// not running.
    pub async fn stop(&self) -> bool {
        // Held until the loop has exited.
        let mut running = self.running.lock().await;
        let Some(Running { stop, task }) = running.take() else {
            return false;
        };

        // A send error only means the loop already exited.
        let _ = stop.send(true);
        if let Err(e) = task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
        drop(running);

        info!(ticks = self.ticks(), "Scheduler stopped");
        true
    }
}

async fn run_loop<H: TickHandler>(
    handler: Arc<H>,
    period: Duration,
    ticks: Arc<AtomicU64>,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let tick = ticks.fetch_add(1, Ordering::AcqRel).saturating_add(1);
                debug!(tick, "Tick fired");
                handler.on_tick(tick, Utc::now()).await;
            }
        }
    }

    debug!("Scheduler loop exited");
}
