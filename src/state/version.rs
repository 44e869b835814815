//! Version compatibility state

use crate::config::TimingConfig;
use crate::scheduler::{Completion, Scheduler, Wake};
use crate::state::{StateEvent, VersionView};

/// One-shot client/server version check
pub struct VersionChecker {
    scheduler: Scheduler,
    timing: TimingConfig,
    view: Option<VersionView>,
}

impl VersionChecker {
    pub fn new(scheduler: Scheduler, timing: TimingConfig) -> Self {
        Self {
            scheduler,
            timing,
            view: None,
        }
    }

    pub fn view(&self) -> Option<&VersionView> {
        self.view.as_ref()
    }

    /// Schedule the version fetch shortly after start-up
    pub fn initialize(&mut self) {
        self.scheduler
            .after(self.timing.version_delay(), Wake::LoadVersion);
    }

    pub fn load_version(&mut self) {
        let api = self.scheduler.api();
        self.scheduler
            .spawn(async move { Completion::Version(api.version().await) });
    }

    /// Handle a completion addressed to the version checker
    pub fn handle(&mut self, completion: Completion) -> Vec<StateEvent> {
        match completion {
            Completion::Wake(Wake::LoadVersion) => {
                self.load_version();
                Vec::new()
            }
            Completion::Version(Ok(info)) => {
                let view = VersionView::from_info(&info);
                match view.is_compatible() {
                    Some(false) => tracing::warn!(
                        "Client API {} differs from server API {}",
                        view.client,
                        view.server.as_deref().unwrap_or_default()
                    ),
                    Some(true) => tracing::info!("API version {}", view.client),
                    None => tracing::info!("Client API {}; server did not report", view.client),
                }
                self.view = Some(view);
                vec![StateEvent::VersionUpdated]
            }
            Completion::Version(Err(e)) => {
                tracing::warn!("Version check failed: {}", e);
                Vec::new()
            }
            other => {
                tracing::debug!("Version checker ignoring {:?}", other);
                Vec::new()
            }
        }
    }
}
