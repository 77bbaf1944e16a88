use async_trait::async_trait;
use futures::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::{io, signal};
use tracing::{error, info};

/// Why the pipeline is going down. Every variant is a clean path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupted,
    ErrorRateExceeded,
    ProducerFinished,
}

pub struct Shutdown<'a> {
    trigger: Trigger,
    waiter: mpsc::Receiver<()>,
    sender_waiter: mpsc::Sender<()>,
    interrupters: Vec<Box<dyn Interrupter + 'a>>,
}

/// A component's view of the shutdown signal.
///
/// Holding a `Signaler` keeps [`Shutdown::register_shutdown`] waiting, so a
/// component is considered quiesced once it drops its signaler.
#[derive(Clone)]
pub struct Signaler {
    is_shutdown: bool,
    receiver: watch::Receiver<Option<ShutdownReason>>,

    #[allow(dead_code)]
    sender_waiter: mpsc::Sender<()>,
}

/// Raises the shutdown signal from inside the pipeline.
#[derive(Clone)]
pub struct Trigger {
    sender: Arc<watch::Sender<Option<ShutdownReason>>>,
}

#[async_trait]
pub trait Interrupter: Send + Sync {
    async fn wait(&self) -> io::Result<()>;
}

pub struct CtrlInterrupter {}

impl CtrlInterrupter {
    pub fn new() -> CtrlInterrupter {
        CtrlInterrupter {}
    }
}

impl Default for CtrlInterrupter {
    fn default() -> CtrlInterrupter {
        CtrlInterrupter::new()
    }
}

#[async_trait]
impl Interrupter for CtrlInterrupter {
    async fn wait(&self) -> io::Result<()> {
        signal::ctrl_c().await
    }
}

#[cfg(unix)]
pub struct TerminateInterrupter {}

#[cfg(unix)]
impl TerminateInterrupter {
    pub fn new() -> TerminateInterrupter {
        TerminateInterrupter {}
    }
}

#[cfg(unix)]
impl Default for TerminateInterrupter {
    fn default() -> TerminateInterrupter {
        TerminateInterrupter::new()
    }
}

#[cfg(unix)]
#[async_trait]
impl Interrupter for TerminateInterrupter {
    async fn wait(&self) -> io::Result<()> {
        let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        term.recv().await;
        Ok(())
    }
}

/// Fires after a fixed delay.
pub struct CountDownInterrupter {
    millis: u64,
}

impl CountDownInterrupter {
    pub fn new(millis: u64) -> CountDownInterrupter {
        CountDownInterrupter { millis }
    }
}

#[async_trait]
impl Interrupter for CountDownInterrupter {
    async fn wait(&self) -> io::Result<()> {
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        Ok(())
    }
}

impl<'a> Shutdown<'a> {
    pub fn new(interrupters: Vec<Box<dyn Interrupter + 'a>>) -> Shutdown<'a> {
        let (send, recv) = mpsc::channel::<()>(1);
        let (tx, _) = watch::channel::<Option<ShutdownReason>>(None);
        Shutdown {
            trigger: Trigger {
                sender: Arc::new(tx),
            },
            waiter: recv,
            sender_waiter: send,
            interrupters,
        }
    }

    pub fn get_signaler(&self) -> Signaler {
        // clone sender_waiter - when all clones go out of scope, waiter.recv() will fire
        Signaler::new(self.trigger.subscribe(), self.sender_waiter.clone())
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    /// Waits for an interrupter or an internal trigger, raises the signal,
    /// then waits until every signaler has been dropped.
    pub async fn register_shutdown(mut self) -> ShutdownReason {
        let mut raised = self.trigger.subscribe();
        let interrupted = async {
            if self.interrupters.is_empty() {
                return future::pending::<()>().await;
            }
            let waits = self.interrupters.iter().map(|i| i.wait());
            let (res, _, _) = future::select_all(waits).await;
            if let Err(e) = res {
                error!(error = %e, "error waiting for interrupt");
            }
        };

        tokio::select! {
            _ = interrupted => {
                self.trigger.fire(ShutdownReason::Interrupted);
            }
            _ = wait_raised(&mut raised) => {}
        }

        let reason = self
            .trigger
            .reason()
            .unwrap_or(ShutdownReason::Interrupted);
        info!(reason = ?reason, "waiting for shutdown...");

        // wait for tasks to finish
        drop(self.sender_waiter);
        let _ = self.waiter.recv().await;
        info!("shutdown");
        reason
    }
}

impl Trigger {
    /// Raises the signal. Only the call that actually raised it returns `true`.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<ShutdownReason>> {
        self.sender.subscribe()
    }
}

impl Signaler {
    pub fn new(
        receiver: watch::Receiver<Option<ShutdownReason>>,
        sender_waiter: mpsc::Sender<()>,
    ) -> Signaler {
        Signaler {
            is_shutdown: false,
            receiver,
            sender_waiter,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown || self.receiver.borrow().is_some()
    }

    /// Resolves once the signal is raised. Cancel safe.
    pub async fn recv(&mut self) -> io::Result<()> {
        if self.is_shutdown {
            return Ok(());
        }

        wait_raised(&mut self.receiver).await;
        self.is_shutdown = true;
        Ok(())
    }
}

async fn wait_raised(receiver: &mut watch::Receiver<Option<ShutdownReason>>) {
    while receiver.borrow_and_update().is_none() {
        if receiver.changed().await.is_err() {
            return;
        }
    }
}
