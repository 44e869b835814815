//! Output formatting utilities for CLI

use serde::Serialize;

use zulu_control::api::{DriveStatus, VersionInfo};
use zulu_control::state::{DisplayMode, SelectionView, StateEvent, StatusView, VersionView};
use zulu_control::Display;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a serializable value as JSON or use custom text formatter
pub fn print_formatted<T, F>(value: &T, format: OutputFormat, text_formatter: F)
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => println!("{}", text_formatter(value)),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message (suppressed in quiet mode)
pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

/// Print an error message (never suppressed)
pub fn print_error(message: &str) {
    eprintln!("Error: {}", message);
}

pub fn format_status(view: &StatusView) -> String {
    if !view.is_loaded() {
        return "Drive:  (waiting for status)".to_string();
    }

    let image = if view.image_name.is_empty() {
        "(none)"
    } else {
        view.image_name.as_str()
    };
    let mut text = format!("Drive:  {}\nImage:  {}", view.drive_label, image);
    if let Some(at) = view.refreshed_at {
        text.push_str(&format!("\nAs of:  {}", at.format("%H:%M:%S")));
    }
    text
}

/// Status of a one-shot `status` fetch
pub fn format_drive_status(status: &DriveStatus) -> String {
    let view = StatusView::from_status(status);
    let image = if view.image_name.is_empty() {
        "(none)"
    } else {
        view.image_name.as_str()
    };
    format!("Drive:  {}\nImage:  {}", view.drive_label, image)
}

/// Numbered image list; the pending mount, if any, is marked
pub fn format_selection(view: &SelectionView) -> String {
    if view.loading {
        return format!("Loading images... ({} so far)", view.received);
    }
    if view.options.is_empty() {
        return "No images available.".to_string();
    }

    let width = view.options.len().to_string().len();
    view.options
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let marker = if view.pending.as_deref() == Some(name.as_str()) {
                "  (mounting)"
            } else {
                ""
            };
            format!("{:>width$}. {}{}", i + 1, name, marker, width = width)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_version(view: &VersionView) -> String {
    let mut lines = vec![format!("Client API: {}", view.client)];
    if let Some(server) = &view.server {
        lines.push(format!("Server API: {}", server));
    }
    if let Some(message) = &view.message {
        lines.push(message.clone());
    }
    if view.is_compatible() == Some(false) {
        lines.push("Warning: client and server API versions differ".to_string());
    }
    lines.join("\n")
}

pub fn format_version_info(info: &VersionInfo) -> String {
    format_version(&VersionView::from_info(info))
}

/// Whole console: the active panel plus the version line
pub fn format_display(display: &Display) -> String {
    let mut text = match display.mode {
        DisplayMode::Status => format!(
            "{}\nAuto:   {}",
            format_status(&display.status),
            if display.auto_refresh { "on" } else { "off" }
        ),
        DisplayMode::Selection => format_selection(&display.selection),
    };
    if let Some(version) = &display.version {
        text.push_str("\n\n");
        text.push_str(&format_version(version));
    }
    text
}

/// Render the events a console step produced. Alerts always print.
pub fn print_events(events: &[StateEvent], display: &Display, format: OutputFormat, quiet: bool) {
    for event in events {
        match event {
            StateEvent::Alert(message) => print_error(message),
            StateEvent::StatusMessage(message) => print_success(message, quiet),
            StateEvent::StatusUpdated if display.mode == DisplayMode::Status => {
                print_formatted(&display.status, format, format_status)
            }
            StateEvent::CatalogReady { .. } => {
                print_formatted(&display.selection, format, format_selection)
            }
            StateEvent::VersionUpdated => {
                if let Some(version) = &display.version {
                    print_formatted(version, format, format_version);
                }
            }
            StateEvent::ShowSelection => print_success("Loading images...", quiet),
            StateEvent::ReturnToStatus => print_success("Back to status.", quiet),
            StateEvent::StatusUpdated => {}
        }
    }
}
