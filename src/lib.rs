//! Control surface for the ZuluIDE virtual CD-ROM service.
//!
//! The board's web server exposes a handful of JSON endpoints: drive status,
//! eject, a chunked image listing and mount. This crate keeps a local view of
//! that state in sync with the board through three components driven by one
//! event loop:
//!
//! - [`state::StatusPoller`]: deferred, manual and periodic status refreshes, and eject
//! - [`state::ImageCatalogLoader`]: image enumeration, selection and mount
//! - [`state::VersionChecker`]: one-shot client/server version check
//!
//! [`console::Console`] owns all three and is what front ends talk to.

pub mod api;
pub mod config;
pub mod console;
pub mod error;
pub mod scheduler;
pub mod state;

#[cfg(test)]
mod fake;

pub use api::{ControlApi, ControlClient};
pub use console::{Command, Console, Display};
pub use error::ApiError;
