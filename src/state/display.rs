//! View-models projected onto the terminal

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::api::{DriveStatus, VersionInfo};

/// Which panel the console is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Drive role and mounted image
    #[default]
    Status,
    /// Image list with commit/cancel
    Selection,
}

/// Status panel contents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusView {
    /// "Primary CD-ROM" or "Secondary CD-ROM"; empty until the first poll lands
    pub drive_label: String,
    /// Mounted image filename, empty when nothing is mounted
    pub image_name: String,
    /// When the shown status was applied
    pub refreshed_at: Option<DateTime<Local>>,
}

impl StatusView {
    pub fn from_status(status: &DriveStatus) -> Self {
        let role = if status.is_primary { "Primary" } else { "Secondary" };
        Self {
            drive_label: format!("{} CD-ROM", role),
            image_name: status
                .image
                .as_ref()
                .map(|image| image.filename.clone())
                .unwrap_or_default(),
            refreshed_at: Some(Local::now()),
        }
    }

    /// Whether any status has been received yet
    pub fn is_loaded(&self) -> bool {
        self.refreshed_at.is_some()
    }
}

/// Selection panel contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionView {
    /// Selectable filenames, in server order
    pub options: Vec<String>,
    /// Enumeration still running
    pub loading: bool,
    /// Images received so far in the running enumeration
    pub received: usize,
    /// Filename whose mount request is in flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<String>,
}

/// Version/compatibility line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionView {
    pub client: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VersionView {
    pub fn from_info(info: &VersionInfo) -> Self {
        Self {
            client: info.client_api_version.clone(),
            // Empty strings count as absent
            server: info
                .server_api_version
                .clone()
                .filter(|server| !server.is_empty()),
            message: info
                .message
                .as_deref()
                .filter(|message| !message.is_empty())
                .map(|message| format!("Message: {}", message)),
        }
    }

    /// `None` when the server did not report its version
    pub fn is_compatible(&self) -> Option<bool> {
        self.server.as_ref().map(|server| *server == self.client)
    }
}
