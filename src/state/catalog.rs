//! Image catalog state: chunked enumeration, selection and mount

use tokio_util::sync::CancellationToken;

use crate::api::{ActionReply, CatalogListing, EnumerationUnit, ImageRef};
use crate::config::{CatalogConfig, CatalogStrategy, TimingConfig};
use crate::error::ApiError;
use crate::scheduler::{Completion, Scheduler, Wake};
use crate::state::{SelectionView, StateEvent};

/// Where the browse workflow stands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BrowsePhase {
    /// Status panel is showing; nothing in flight
    #[default]
    Idle,
    /// Pulling the listing from the service
    Enumerating,
    /// Listing complete, waiting for the operator to pick
    Selecting,
    /// Mount request for `filename` in flight
    Mounting { filename: String },
}

/// One enumeration run. Completions carrying another id are stale.
struct Session {
    id: u64,
    cancel: CancellationToken,
    /// `wait` answers (and rejected payloads) since the last image arrived
    idle_polls: u32,
}

/// Enumerates mountable images and commits the operator's choice.
pub struct ImageCatalogLoader {
    scheduler: Scheduler,
    config: CatalogConfig,
    timing: TimingConfig,
    /// Images in delivery order, duplicates kept
    catalog: Vec<ImageRef>,
    /// The catalog holds a finished listing and can be reused
    complete: bool,
    phase: BrowsePhase,
    session: Option<Session>,
    last_session_id: u64,
    /// Malformed units rejected over the lifetime of the loader
    rejected: usize,
}

impl ImageCatalogLoader {
    pub fn new(scheduler: Scheduler, config: CatalogConfig, timing: TimingConfig) -> Self {
        Self {
            scheduler,
            config,
            timing,
            catalog: Vec::new(),
            complete: false,
            phase: BrowsePhase::Idle,
            session: None,
            last_session_id: 0,
            rejected: 0,
        }
    }

    pub fn phase(&self) -> &BrowsePhase {
        &self.phase
    }

    pub fn images(&self) -> &[ImageRef] {
        &self.catalog
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Id of the running enumeration session, if any
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Snapshot for the selection panel
    pub fn selection_view(&self) -> SelectionView {
        let options = match self.phase {
            BrowsePhase::Selecting | BrowsePhase::Mounting { .. } => {
                self.catalog.iter().map(|i| i.filename.clone()).collect()
            }
            _ => Vec::new(),
        };

        SelectionView {
            options,
            loading: self.phase == BrowsePhase::Enumerating,
            received: self.catalog.len(),
            pending: match &self.phase {
                BrowsePhase::Mounting { filename } => Some(filename.clone()),
                _ => None,
            },
        }
    }

    /// Switch to the selection panel, reusing a finished listing if there is one.
    pub fn start_browsing(&mut self) -> Vec<StateEvent> {
        match self.phase {
            BrowsePhase::Idle => {}
            BrowsePhase::Enumerating | BrowsePhase::Selecting => {
                return vec![StateEvent::ShowSelection];
            }
            BrowsePhase::Mounting { .. } => {
                tracing::debug!("Browse requested while a mount is pending");
                return Vec::new();
            }
        }

        if self.complete && !self.catalog.is_empty() {
            self.phase = BrowsePhase::Selecting;
            tracing::debug!("Reusing catalog of {} images", self.catalog.len());
            return vec![
                StateEvent::ShowSelection,
                StateEvent::CatalogReady {
                    count: self.catalog.len(),
                },
            ];
        }

        self.begin_session();
        vec![
            StateEvent::ShowSelection,
            StateEvent::StatusMessage("Loading images...".to_string()),
        ]
    }

    fn begin_session(&mut self) {
        self.catalog.clear();
        self.complete = false;
        self.last_session_id += 1;
        self.session = Some(Session {
            id: self.last_session_id,
            cancel: CancellationToken::new(),
            idle_polls: 0,
        });
        self.phase = BrowsePhase::Enumerating;

        tracing::info!(
            session = self.last_session_id,
            "Starting image enumeration ({:?})",
            self.config.strategy
        );
        self.enumerate_step();
    }

    /// Issue the next listing request for the running session.
    pub fn enumerate_step(&mut self) {
        let Some(session) = &self.session else {
            tracing::debug!("No enumeration session; step skipped");
            return;
        };

        let id = session.id;
        let cancel = session.cancel.clone();
        let api = self.scheduler.api();

        match self.config.strategy {
            CatalogStrategy::Iterate => {
                self.scheduler.spawn_cancellable(cancel, async move {
                    Completion::Enumeration {
                        session: id,
                        result: api.next_image().await,
                    }
                });
            }
            CatalogStrategy::Bulk => {
                self.scheduler.spawn_cancellable(cancel, async move {
                    Completion::Listing {
                        session: id,
                        result: api.images().await,
                    }
                });
            }
        }
    }

    /// Leave the selection panel. A mount still waiting for its reply is
    /// abandoned.
    pub fn cancel(&mut self) -> Vec<StateEvent> {
        match self.phase {
            BrowsePhase::Idle => return Vec::new(),
            BrowsePhase::Mounting { ref filename } => {
                // A reply arriving later no longer matches the phase and is dropped
                tracing::warn!("Leaving selection with the mount of {} unanswered", filename);
            }
            BrowsePhase::Enumerating => {
                if let Some(session) = self.session.take() {
                    session.cancel.cancel();
                    tracing::info!(session = session.id, "Enumeration cancelled");
                }
                self.catalog.clear();
                self.complete = false;
            }
            BrowsePhase::Selecting => {}
        }

        self.phase = BrowsePhase::Idle;
        vec![StateEvent::ReturnToStatus]
    }

    /// Mount `filename`. Stays on the selection panel, marked pending, until the
    /// service answers; then returns to the status panel whatever the answer.
    pub fn commit(&mut self, filename: &str) -> Vec<StateEvent> {
        if self.phase != BrowsePhase::Selecting {
            tracing::debug!("Commit ignored in phase {:?}", self.phase);
            return vec![StateEvent::StatusMessage(
                "No image list to select from".to_string(),
            )];
        }

        let filename = filename.to_string();
        self.phase = BrowsePhase::Mounting {
            filename: filename.clone(),
        };

        let api = self.scheduler.api();
        let request_name = filename.clone();
        self.scheduler.spawn(async move {
            let result = api.mount(&request_name).await;
            Completion::Mount {
                filename: request_name,
                result,
            }
        });

        tracing::info!("Mount requested: {}", filename);
        vec![StateEvent::StatusMessage(format!("Mounting {}...", filename))]
    }

    /// Handle a completion addressed to the catalog loader
    pub fn handle(&mut self, completion: Completion) -> Vec<StateEvent> {
        match completion {
            Completion::Wake(Wake::EnumerationRetry { session }) => {
                if self.is_current(session) {
                    self.enumerate_step();
                } else {
                    tracing::debug!(session, "Ignoring retry for finished session");
                }
                Vec::new()
            }
            Completion::Enumeration { session, result } => {
                if !self.is_current(session) {
                    tracing::debug!(session, "Discarding unit from stale session");
                    return Vec::new();
                }
                self.apply_unit(result)
            }
            Completion::Listing { session, result } => {
                if !self.is_current(session) {
                    tracing::debug!(session, "Discarding listing from stale session");
                    return Vec::new();
                }
                self.apply_listing(result)
            }
            Completion::Mount { filename, result } => self.finish_mount(filename, result),
            other => {
                tracing::debug!("Catalog loader ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn is_current(&self, session: u64) -> bool {
        self.phase == BrowsePhase::Enumerating && self.session_id() == Some(session)
    }

    fn apply_unit(&mut self, result: Result<EnumerationUnit, ApiError>) -> Vec<StateEvent> {
        match result {
            Ok(EnumerationUnit::Item(image)) => {
                if let Some(session) = self.session.as_mut() {
                    session.idle_polls = 0;
                }
                self.catalog.push(image);
                self.enumerate_step();
                Vec::new()
            }
            Ok(EnumerationUnit::Wait) => self.back_off(),
            Ok(EnumerationUnit::Done) => self.finish_enumeration(),
            Err(e) if e.is_malformed() => {
                self.rejected += 1;
                tracing::warn!("Rejected enumeration unit: {}", e);
                if self.note_idle_poll() {
                    self.enumerate_step();
                    Vec::new()
                } else {
                    self.fail_session("Image listing produced no usable entries".to_string())
                }
            }
            Err(e) => self.fail_session(format!("Image listing failed: {}", e)),
        }
    }

    fn apply_listing(&mut self, result: Result<CatalogListing, ApiError>) -> Vec<StateEvent> {
        match result {
            Ok(CatalogListing::Wait) => self.back_off(),
            Ok(CatalogListing::Images(images)) => {
                self.catalog = images;
                self.finish_enumeration()
            }
            Err(e) => self.fail_session(format!("Image listing failed: {}", e)),
        }
    }

    /// Count one poll that produced no image. False once the budget is spent.
    fn note_idle_poll(&mut self) -> bool {
        let limit = self.config.max_consecutive_waits;
        match self.session.as_mut() {
            Some(session) => {
                session.idle_polls += 1;
                session.idle_polls <= limit
            }
            None => false,
        }
    }

    fn back_off(&mut self) -> Vec<StateEvent> {
        if !self.note_idle_poll() {
            return self.fail_session(format!(
                "Image listing still not ready after {} polls",
                self.config.max_consecutive_waits
            ));
        }

        if let Some(session) = &self.session {
            self.scheduler.after_cancellable(
                self.timing.enumeration_backoff(),
                Wake::EnumerationRetry { session: session.id },
                session.cancel.clone(),
            );
        }
        Vec::new()
    }

    fn finish_enumeration(&mut self) -> Vec<StateEvent> {
        self.session = None;
        self.complete = true;
        self.phase = BrowsePhase::Selecting;

        let count = self.catalog.len();
        tracing::info!("Image enumeration complete: {} images", count);
        vec![StateEvent::CatalogReady { count }]
    }

    fn fail_session(&mut self, message: String) -> Vec<StateEvent> {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
        self.catalog.clear();
        self.complete = false;
        self.phase = BrowsePhase::Idle;

        tracing::error!("{}", message);
        vec![StateEvent::StatusMessage(message), StateEvent::ReturnToStatus]
    }

    fn finish_mount(
        &mut self,
        filename: String,
        result: Result<ActionReply, ApiError>,
    ) -> Vec<StateEvent> {
        match &self.phase {
            BrowsePhase::Mounting { filename: pending } if *pending == filename => {}
            _ => {
                tracing::debug!("Discarding mount reply for {}", filename);
                return Vec::new();
            }
        }
        self.phase = BrowsePhase::Idle;

        match result {
            Ok(reply) if reply.is_ok() => {
                tracing::info!("Mounted {}", filename);
                vec![
                    StateEvent::StatusMessage(format!("Mounted {}", filename)),
                    StateEvent::ReturnToStatus,
                ]
            }
            Ok(reply) => {
                tracing::warn!("Mount of {} rejected with status {:?}", filename, reply.status);
                vec![
                    StateEvent::Alert("Select failed.".to_string()),
                    StateEvent::ReturnToStatus,
                ]
            }
            Err(e) => {
                tracing::error!("Mount request for {} failed: {}", filename, e);
                vec![
                    StateEvent::StatusMessage(format!("Mount request failed: {}", e)),
                    StateEvent::ReturnToStatus,
                ]
            }
        }
    }
}

impl Drop for ImageCatalogLoader {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}
