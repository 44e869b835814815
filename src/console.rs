//! The console event loop.
//!
//! `Console` owns the three state components, the display mode and the
//! receiving end of the completion channel. Front ends feed it operator
//! commands through `dispatch` and pump `next` to process whatever finished
//! in the background; both return the events the front end should render.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::api::ControlApi;
use crate::config::Config;
use crate::scheduler::{Completion, Scheduler, Wake};
use crate::state::{
    DisplayMode, ImageCatalogLoader, SelectionView, StateEvent, StatusPoller, StatusView,
    VersionChecker, VersionView,
};

/// Operator intents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Eject,
    AutoRefresh(bool),
    Browse,
    Commit(String),
    Cancel,
}

/// Everything the front end needs to draw the console
#[derive(Debug, Clone, Serialize)]
pub struct Display {
    pub mode: DisplayMode,
    pub status: StatusView,
    pub auto_refresh: bool,
    pub selection: SelectionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionView>,
}

/// Component a completion belongs to
enum Owner {
    Status,
    Catalog,
    Version,
}

impl Owner {
    fn of(completion: &Completion) -> Self {
        match completion {
            Completion::Wake(Wake::DeferredRefresh { .. } | Wake::AutoRefresh)
            | Completion::Status { .. }
            | Completion::Eject(_) => Owner::Status,
            Completion::Wake(Wake::EnumerationRetry { .. })
            | Completion::Enumeration { .. }
            | Completion::Listing { .. }
            | Completion::Mount { .. } => Owner::Catalog,
            Completion::Wake(Wake::LoadVersion) | Completion::Version(_) => Owner::Version,
        }
    }
}

pub struct Console {
    status: StatusPoller,
    catalog: ImageCatalogLoader,
    version: VersionChecker,
    mode: DisplayMode,
    completions: mpsc::UnboundedReceiver<Completion>,
}

impl Console {
    pub fn new(api: Arc<dyn ControlApi>, config: &Config) -> Self {
        let (scheduler, completions) = Scheduler::new(api);

        Self {
            status: StatusPoller::new(scheduler.clone(), config.timing.clone()),
            catalog: ImageCatalogLoader::new(
                scheduler.clone(),
                config.catalog.clone(),
                config.timing.clone(),
            ),
            version: VersionChecker::new(scheduler, config.timing.clone()),
            mode: DisplayMode::Status,
            completions,
        }
    }

    /// Kick off the start-up refresh and version check
    pub fn start(&mut self) {
        tracing::info!("Console starting");
        self.status.initialize();
        self.version.initialize();
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn status(&self) -> &StatusPoller {
        &self.status
    }

    pub fn catalog(&self) -> &ImageCatalogLoader {
        &self.catalog
    }

    pub fn version(&self) -> &VersionChecker {
        &self.version
    }

    pub fn display(&self) -> Display {
        Display {
            mode: self.mode,
            status: self.status.view().clone(),
            auto_refresh: self.status.is_auto_refresh_active(),
            selection: self.catalog.selection_view(),
            version: self.version.view().cloned(),
        }
    }

    /// Apply an operator command
    pub fn dispatch(&mut self, command: Command) -> Vec<StateEvent> {
        tracing::debug!("Dispatching {:?}", command);

        let events = match command {
            Command::Refresh => {
                self.status.refresh();
                Vec::new()
            }
            Command::Eject => self.status.eject().into_iter().collect(),
            Command::AutoRefresh(enabled) => {
                self.status.set_auto_refresh(enabled).into_iter().collect()
            }
            Command::Browse => self.catalog.start_browsing(),
            Command::Commit(filename) => self.catalog.commit(&filename),
            Command::Cancel => self.catalog.cancel(),
        };

        self.route(events)
    }

    /// Wait for the next background completion and process it.
    /// Returns `None` once no task can post anymore.
    pub async fn next(&mut self) -> Option<Vec<StateEvent>> {
        let completion = self.completions.recv().await?;
        Some(self.handle(completion))
    }

    /// Route a completion to the component that issued it
    pub fn handle(&mut self, completion: Completion) -> Vec<StateEvent> {
        let events = match Owner::of(&completion) {
            Owner::Status => self.status.handle(completion),
            Owner::Catalog => self.catalog.handle(completion),
            Owner::Version => self.version.handle(completion),
        };

        self.route(events)
    }

    /// Apply display-mode events, then pass everything on to the front end.
    fn route(&mut self, events: Vec<StateEvent>) -> Vec<StateEvent> {
        for event in &events {
            match event {
                StateEvent::ShowSelection => self.mode = DisplayMode::Selection,
                StateEvent::ReturnToStatus => {
                    self.mode = DisplayMode::Status;
                    self.status.schedule_refresh();
                }
                StateEvent::Alert(message) => tracing::warn!("Alert: {}", message),
                _ => {}
            }
        }
        events
    }
}
