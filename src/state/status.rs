//! Drive status state: one-shot, deferred and periodic refreshes, and eject

use tokio::task::JoinHandle;

use crate::api::{ActionReply, DriveStatus};
use crate::config::TimingConfig;
use crate::error::ApiError;
use crate::scheduler::{Completion, Scheduler, Wake};
use crate::state::{StateEvent, StatusView};

/// Where the eject workflow stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EjectPhase {
    #[default]
    Idle,
    /// Eject request sent, reply not yet in
    AwaitingEject,
    /// Service accepted the eject; waiting out the settle delay
    AwaitingDeferredRefresh,
}

/// Keeps the status view in step with the service.
///
/// Every refresh carries an epoch. A response is applied only if it is newer
/// than the last one applied, so a slow early request can never overwrite the
/// answer to a later one.
pub struct StatusPoller {
    scheduler: Scheduler,
    timing: TimingConfig,
    /// What the status panel shows
    view: StatusView,
    /// Epoch of the most recently issued refresh
    issued_epoch: u64,
    /// Epoch of the response currently shown
    applied_epoch: u64,
    /// Status requests without a response yet
    in_flight: usize,
    /// Deferred refreshes whose timer has not fired yet
    pending_refreshes: usize,
    /// Recurring auto-refresh timer, if enabled
    auto_refresh: Option<JoinHandle<()>>,
    eject: EjectPhase,
}

impl StatusPoller {
    pub fn new(scheduler: Scheduler, timing: TimingConfig) -> Self {
        Self {
            scheduler,
            timing,
            view: StatusView::default(),
            issued_epoch: 0,
            applied_epoch: 0,
            in_flight: 0,
            pending_refreshes: 0,
            auto_refresh: None,
            eject: EjectPhase::Idle,
        }
    }

    pub fn view(&self) -> &StatusView {
        &self.view
    }

    pub fn eject_phase(&self) -> EjectPhase {
        self.eject
    }

    pub fn is_auto_refresh_active(&self) -> bool {
        self.auto_refresh.is_some()
    }

    /// Whether a status request is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.in_flight > 0
    }

    pub fn pending_refreshes(&self) -> usize {
        self.pending_refreshes
    }

    /// Start-up: auto-refresh off, then one refresh once the service settles
    pub fn initialize(&mut self) {
        self.set_auto_refresh(false);
        self.schedule_refresh();
    }

    /// Refresh once after the settle delay
    pub fn schedule_refresh(&mut self) {
        self.schedule_deferred(false);
    }

    fn schedule_deferred(&mut self, after_eject: bool) {
        self.pending_refreshes += 1;
        self.scheduler.after(
            self.timing.settle_delay(),
            Wake::DeferredRefresh { after_eject },
        );
        tracing::debug!(
            "Status refresh scheduled in {:?}",
            self.timing.settle_delay()
        );
    }

    /// Issue a status request now. Returns the epoch it was tagged with.
    pub fn refresh(&mut self) -> u64 {
        self.issued_epoch += 1;
        self.in_flight += 1;

        let epoch = self.issued_epoch;
        let api = self.scheduler.api();
        self.scheduler.spawn(async move {
            Completion::Status {
                epoch,
                result: api.status().await,
            }
        });

        tracing::debug!(epoch, "Status refresh issued");
        epoch
    }

    /// Ask the service to eject the mounted image.
    /// Ignored while a previous eject is still being confirmed.
    pub fn eject(&mut self) -> Option<StateEvent> {
        if self.eject != EjectPhase::Idle {
            tracing::debug!("Eject already pending ({:?})", self.eject);
            return None;
        }

        self.eject = EjectPhase::AwaitingEject;
        let api = self.scheduler.api();
        self.scheduler
            .spawn(async move { Completion::Eject(api.eject().await) });

        tracing::info!("Eject requested");
        Some(StateEvent::StatusMessage("Ejecting...".to_string()))
    }

    /// Turn the recurring refresh on or off. A no-op when already in the
    /// requested state, so at most one timer ever exists.
    pub fn set_auto_refresh(&mut self, enabled: bool) -> Option<StateEvent> {
        match (enabled, self.auto_refresh.is_some()) {
            (true, false) => {
                let period = self.timing.auto_refresh_period();
                self.auto_refresh = Some(self.scheduler.every(period, Wake::AutoRefresh));
                tracing::info!("Auto-refresh enabled every {:?}", period);
                Some(StateEvent::StatusMessage(format!(
                    "Auto-refresh on (every {}s)",
                    period.as_secs()
                )))
            }
            (false, true) => {
                if let Some(timer) = self.auto_refresh.take() {
                    timer.abort();
                }
                tracing::info!("Auto-refresh disabled");
                Some(StateEvent::StatusMessage("Auto-refresh off".to_string()))
            }
            _ => None,
        }
    }

    /// Handle a completion addressed to the status poller
    pub fn handle(&mut self, completion: Completion) -> Vec<StateEvent> {
        match completion {
            Completion::Wake(Wake::DeferredRefresh { after_eject }) => {
                self.pending_refreshes = self.pending_refreshes.saturating_sub(1);
                if after_eject && self.eject == EjectPhase::AwaitingDeferredRefresh {
                    self.eject = EjectPhase::Idle;
                }
                self.refresh();
                Vec::new()
            }
            Completion::Wake(Wake::AutoRefresh) => {
                // A tick can already be queued when the timer is aborted
                if self.auto_refresh.is_some() {
                    self.refresh();
                } else {
                    tracing::debug!("Ignoring auto-refresh tick after disable");
                }
                Vec::new()
            }
            Completion::Status { epoch, result } => self.apply_status(epoch, result),
            Completion::Eject(result) => self.finish_eject(result),
            other => {
                tracing::debug!("Status poller ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn apply_status(&mut self, epoch: u64, result: Result<DriveStatus, ApiError>) -> Vec<StateEvent> {
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            Ok(status) if epoch > self.applied_epoch => {
                self.applied_epoch = epoch;
                self.view = StatusView::from_status(&status);
                tracing::debug!(epoch, "Applied drive status: {:?}", status);
                vec![StateEvent::StatusUpdated]
            }
            Ok(_) => {
                tracing::debug!(
                    epoch,
                    applied = self.applied_epoch,
                    "Discarding stale status response"
                );
                Vec::new()
            }
            Err(e) => {
                // No retry and no alert; the panel keeps the last status
                tracing::warn!(epoch, "Status refresh failed: {}", e);
                Vec::new()
            }
        }
    }

    fn finish_eject(&mut self, result: Result<ActionReply, ApiError>) -> Vec<StateEvent> {
        match result {
            Ok(reply) if reply.is_ok() => {
                self.eject = EjectPhase::AwaitingDeferredRefresh;
                self.schedule_deferred(true);
                tracing::info!("Eject accepted");
                vec![StateEvent::StatusMessage("Eject accepted".to_string())]
            }
            Ok(reply) => {
                self.eject = EjectPhase::Idle;
                tracing::warn!("Eject rejected with status {:?}", reply.status);
                vec![StateEvent::Alert("Eject failed.".to_string())]
            }
            Err(e) => {
                self.eject = EjectPhase::Idle;
                tracing::error!("Eject request failed: {}", e);
                vec![StateEvent::StatusMessage(format!("Eject request failed: {}", e))]
            }
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(timer) = self.auto_refresh.take() {
            timer.abort();
        }
    }
}
