use super::error_window::ErrorWindow;
use super::events::{Event, Events};
use super::job::{Job, WorkerId};
use super::pool::WorkerPool;
use super::scaling::{ScalingDecision, ScalingPolicy, ScalingState};
use super::shutdown::{ShutdownReason, Signaler, Trigger};
use super::worker::Handler;
use async_channel::Sender;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// What the supervisor leaves behind once every worker is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub auto_shutdown: bool,
    pub forced: Vec<WorkerId>,
}

/// Owns the worker pool and the error window. Nothing else writes to either.
pub struct Supervisor<H> {
    pool: WorkerPool<H>,
    policy: ScalingPolicy,
    state: ScalingState,
    window: ErrorWindow,
    interval: Duration,
    grace: Duration,
    queue: Sender<Job>,
    failures: mpsc::UnboundedReceiver<Instant>,
    signaler: Signaler,
    trigger: Trigger,
    events: Events,
    auto_shutdown: bool,
}

pub struct SupervisorSettings {
    pub policy: ScalingPolicy,
    pub window: ErrorWindow,
    pub interval: Duration,
    pub grace: Duration,
}

impl<H: Handler> Supervisor<H> {
    /// `queue` is sampled for occupancy and closed on shutdown, never sent on.
    pub fn new(
        pool: WorkerPool<H>,
        settings: SupervisorSettings,
        queue: Sender<Job>,
        failures: mpsc::UnboundedReceiver<Instant>,
        signaler: Signaler,
        trigger: Trigger,
        events: Events,
    ) -> Supervisor<H> {
        Supervisor {
            pool,
            policy: settings.policy,
            state: ScalingState::new(0),
            window: settings.window,
            interval: settings.interval,
            grace: settings.grace,
            queue,
            failures,
            signaler,
            trigger,
            events,
            auto_shutdown: false,
        }
    }

    pub async fn run(mut self) -> SupervisorReport {
        while self.pool.active() < self.policy.min {
            self.pool.spawn(self.signaler.clone());
        }
        self.state = ScalingState::new(self.pool.active());

        let mut interval = tokio::time::interval(self.interval);
        // one scaling step per interval, even after a stall
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;

        while !self.signaler.is_shutdown() {
            tokio::select! {
                biased;
                _ = self.signaler.recv() => break,
                Some(at) = self.failures.recv() => self.record_failure(at),
                _ = interval.tick() => self.tick(),
            }
        }

        // workers drain whatever is buffered and leave once the closed queue
        // runs dry; closing here covers a producer that never got to it
        self.queue.close();
        let forced = self.pool.shutdown(self.grace).await;

        SupervisorReport {
            auto_shutdown: self.auto_shutdown,
            forced,
        }
    }

    fn tick(&mut self) {
        self.pool.reap();

        let occupancy = self.queue.len();
        let from = self.state.count;
        match self.state.apply(&self.policy, occupancy) {
            ScalingDecision::ScaleUp => {
                self.pool.spawn(self.signaler.clone());
                self.events.emit(Event::ScaledUp {
                    from,
                    to: self.state.count,
                    occupancy,
                });
            }
            ScalingDecision::ScaleDown => {
                self.pool.request_stop_one();
                self.events.emit(Event::ScaledDown {
                    from,
                    to: self.state.count,
                    occupancy,
                });
            }
            ScalingDecision::Steady => {
                debug!(
                    count = from,
                    live = self.pool.live(),
                    occupancy,
                    "steady"
                );
            }
        }

        if self.window.check(Instant::now()) {
            self.auto_shutdown();
        }
    }

    fn record_failure(&mut self, at: Instant) {
        if self.window.record(at, Instant::now()) {
            self.auto_shutdown();
        }
    }

    fn auto_shutdown(&mut self) {
        if !self.trigger.fire(ShutdownReason::ErrorRateExceeded) {
            return;
        }
        self.auto_shutdown = true;
        self.events.emit(Event::AutoShutdownTriggered {
            errors: self.window.len(),
            window: self.window.width(),
        });
    }
}
