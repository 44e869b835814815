//! Task scheduling for the console event loop
//!
//! Service calls and timers run as spawned tokio tasks. None of them touch
//! component state directly: each posts a `Completion` back on one channel,
//! and the console hands it to the component that issued it. All state
//! changes therefore happen on the task that drains the channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ActionReply, CatalogListing, ControlApi, DriveStatus, EnumerationUnit, VersionInfo};
use crate::error::ApiError;

/// Timer wake-ups posted back into the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// One-shot refresh after the settle delay; `after_eject` marks the one
    /// an accepted eject is waiting for
    DeferredRefresh { after_eject: bool },
    /// Tick of the recurring auto-refresh timer
    AutoRefresh,
    /// One-shot version fetch after start-up
    LoadVersion,
    /// Backoff elapsed for an enumeration session that saw `wait`
    EnumerationRetry { session: u64 },
}

/// A finished timer or service call, tagged so stale results can be told apart
#[derive(Debug)]
pub enum Completion {
    Wake(Wake),
    Status {
        epoch: u64,
        result: Result<DriveStatus, ApiError>,
    },
    Eject(Result<ActionReply, ApiError>),
    Enumeration {
        session: u64,
        result: Result<EnumerationUnit, ApiError>,
    },
    Listing {
        session: u64,
        result: Result<CatalogListing, ApiError>,
    },
    Mount {
        filename: String,
        result: Result<ActionReply, ApiError>,
    },
    Version(Result<VersionInfo, ApiError>),
}

/// Spawns service calls and timers whose results come back as `Completion`s
#[derive(Clone)]
pub struct Scheduler {
    api: Arc<dyn ControlApi>,
    tx: mpsc::UnboundedSender<Completion>,
}

impl Scheduler {
    /// Create a scheduler and the receiving end of its completion channel
    pub fn new(api: Arc<dyn ControlApi>) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { api, tx }, rx)
    }

    /// Shared handle to the service, for moving into spawned calls
    pub fn api(&self) -> Arc<dyn ControlApi> {
        Arc::clone(&self.api)
    }

    /// Run `job` and post its completion.
    pub fn spawn<F>(&self, job: F) -> JoinHandle<()>
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let completion = job.await;
            post(&tx, completion);
        })
    }

    /// Run `job` unless `cancel` fires first, in which case nothing is posted.
    pub fn spawn_cancellable<F>(&self, cancel: CancellationToken, job: F) -> JoinHandle<()>
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Dropping cancelled request");
                }
                completion = job => post(&tx, completion),
            }
        })
    }

    /// Post `wake` once after `delay`.
    pub fn after(&self, delay: Duration, wake: Wake) -> JoinHandle<()> {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            Completion::Wake(wake)
        })
    }

    /// Post `wake` once after `delay` unless `cancel` fires first.
    pub fn after_cancellable(
        &self,
        delay: Duration,
        wake: Wake,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        self.spawn_cancellable(cancel, async move {
            tokio::time::sleep(delay).await;
            Completion::Wake(wake)
        })
    }

    /// Post `wake` every `period`, first tick one period from now.
    ///
    /// The timer runs until the returned handle is aborted or the event loop
    /// goes away.
    pub fn every(&self, period: Duration, wake: Wake) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Completion::Wake(wake)).is_err() {
                    break;
                }
            }
        })
    }
}

fn post(tx: &mpsc::UnboundedSender<Completion>, completion: Completion) {
    if tx.send(completion).is_err() {
        tracing::debug!("Event loop closed; dropping completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeApi;

    #[tokio::test(start_paused = true)]
    async fn test_after_posts_once_after_delay() {
        let (scheduler, mut rx) = Scheduler::new(FakeApi::shared());
        let started = Instant::now();

        scheduler.after(Duration::from_millis(500), Wake::LoadVersion);

        let completion = rx.recv().await.unwrap();
        assert!(matches!(completion, Completion::Wake(Wake::LoadVersion)));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_ticks_until_aborted() {
        let (scheduler, mut rx) = Scheduler::new(FakeApi::shared());
        let started = Instant::now();

        let timer = scheduler.every(Duration::from_secs(45), Wake::AutoRefresh);

        assert!(matches!(rx.recv().await, Some(Completion::Wake(Wake::AutoRefresh))));
        assert!(started.elapsed() >= Duration::from_secs(45));
        assert!(matches!(rx.recv().await, Some(Completion::Wake(Wake::AutoRefresh))));
        assert!(started.elapsed() >= Duration::from_secs(90));

        timer.abort();
        let next = tokio::time::timeout(Duration::from_secs(120), rx.recv()).await;
        assert!(next.is_err(), "aborted timer must not tick again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_job_posts_nothing() {
        let (scheduler, mut rx) = Scheduler::new(FakeApi::shared());
        let cancel = CancellationToken::new();

        scheduler.after_cancellable(
            Duration::from_millis(50),
            Wake::EnumerationRetry { session: 1 },
            cancel.clone(),
        );
        cancel.cancel();

        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(next.is_err());
    }
}
