//! Console state modules
//!
//! Each component owns its slice of the view-model and the requests it has in
//! flight. Operations and completion handlers return `StateEvent`s instead of
//! reaching into each other; the console applies the ones that change the
//! display mode and forwards the rest to the front end.

mod catalog;
mod display;
mod status;
mod version;

pub use catalog::{BrowsePhase, ImageCatalogLoader};
pub use display::{DisplayMode, SelectionView, StatusView, VersionView};
pub use status::{EjectPhase, StatusPoller};
pub use version::VersionChecker;

/// Events that state operations and completion handlers can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Transient progress text for the status line
    StatusMessage(String),

    /// Blocking, user-visible failure of an operator action
    Alert(String),

    /// A new drive status has been applied to the status view
    StatusUpdated,

    /// Enumeration finished and the selection list can be shown
    CatalogReady { count: usize },

    /// Version information has been applied to the version view
    VersionUpdated,

    /// Switch the display to the selection panel
    ShowSelection,

    /// Switch the display back to the status panel
    ReturnToStatus,
}

impl StateEvent {
    pub fn is_alert(&self) -> bool {
        matches!(self, StateEvent::Alert(_))
    }
}
