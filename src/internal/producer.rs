use super::events::{Event, Events};
use super::job::{Job, JobId};
use super::shutdown::{ShutdownReason, Signaler, Trigger};
use async_channel::Sender;
use rand::RngExt;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(100);

/// Counts reported by the producer once it has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub enqueued: u64,
}

pub struct Producer {
    rate_per_sec: f32,
    demo: bool,
    max_jobs: Option<u64>,
}

impl Producer {
    pub fn new(rate_per_sec: f32, demo: bool, max_jobs: Option<u64>) -> Producer {
        Producer {
            rate_per_sec,
            demo,
            max_jobs,
        }
    }

    /// Enqueues jobs until shutdown or the job limit, then closes the queue.
    ///
    /// A full queue blocks the producer. Shutdown wins over a blocked send:
    /// the job on offer is dropped before it was ever accepted.
    pub async fn run(
        self,
        tx: Sender<Job>,
        mut signaler: Signaler,
        trigger: Trigger,
        events: Events,
    ) -> ProducerReport {
        let mut interval = tokio::time::interval(TICK);
        // missed ticks are skipped, not replayed as a burst
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut rate_calculator: Box<dyn RateCalculator + Send> = if self.demo {
            Box::new(VariableRateCalculator::new(self.rate_per_sec))
        } else {
            Box::new(RegularRateCalculator::new(self.rate_per_sec))
        };
        let mut next_id: u64 = 1;

        'produce: while !signaler.is_shutdown() {
            tokio::select! {
                _ = signaler.recv() => break,
                _ = interval.tick() => {
                    for _ in 0..rate_calculator.next_batch() {
                        if self.max_jobs.map_or(false, |max| next_id > max) {
                            trigger.fire(ShutdownReason::ProducerFinished);
                            break 'produce;
                        }

                        let job = Job::new(JobId(next_id), rand::rng().random());
                        tokio::select! {
                            biased;
                            _ = signaler.recv() => break 'produce,
                            sent = tx.send(job) => {
                                if sent.is_err() {
                                    break 'produce;
                                }
                                next_id += 1;
                            }
                        }
                    }
                }
            }
        }

        tx.close();

        let report = ProducerReport {
            enqueued: next_id - 1,
        };
        events.emit(Event::ProducerStopped {
            enqueued: report.enqueued,
        });
        report
    }
}

/// Turns a per-second rate into a job count per 100ms tick.
pub trait RateCalculator {
    fn next_batch(&mut self) -> i32;
}

pub struct RegularRateCalculator {
    acc: f32,
    count_per_sec: f32,
}

impl RegularRateCalculator {
    pub fn new(rate_per_sec: f32) -> RegularRateCalculator {
        RegularRateCalculator {
            acc: 0.0,
            count_per_sec: rate_per_sec,
        }
    }

    fn set_rate(&mut self, rate_per_sec: f32) {
        self.count_per_sec = rate_per_sec;
    }
}

impl RateCalculator for RegularRateCalculator {
    fn next_batch(&mut self) -> i32 {
        let chunk = self.count_per_sec / 10.0;
        let chunk_round = (chunk * 10_000_000.0).round() / 10_000_000.0;
        self.acc += chunk_round;
        if self.acc >= 1.0 {
            let r = self.acc;
            self.acc = r.rem_euclid(r.floor());
            r.floor() as i32
        } else {
            0
        }
    }
}

/// Cycles the base rate through burst, steady and quiet phases so the pool
/// has something to scale against.
pub struct VariableRateCalculator {
    inner: RegularRateCalculator,
    base: f32,
    tick: usize,
}

/// (multiplier, ticks)
const PHASES: [(f32, usize); 4] = [(1.0, 50), (4.0, 50), (1.0, 30), (0.1, 70)];

impl VariableRateCalculator {
    pub fn new(rate_per_sec: f32) -> VariableRateCalculator {
        VariableRateCalculator {
            inner: RegularRateCalculator::new(rate_per_sec),
            base: rate_per_sec,
            tick: 0,
        }
    }

    fn multiplier(&self) -> f32 {
        let cycle: usize = PHASES.iter().map(|(_, ticks)| ticks).sum();
        let mut at = self.tick % cycle;
        for (multiplier, ticks) in PHASES.iter() {
            if at < *ticks {
                return *multiplier;
            }
            at -= ticks;
        }
        1.0
    }
}

impl RateCalculator for VariableRateCalculator {
    fn next_batch(&mut self) -> i32 {
        let rate = self.base * self.multiplier();
        self.inner.set_rate(rate);
        self.tick += 1;
        self.inner.next_batch()
    }
}
