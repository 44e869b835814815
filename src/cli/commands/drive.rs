//! Drive commands: status, eject, mount, images, version and watch

use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;

use zulu_control::config::Config;
use zulu_control::state::StateEvent;
use zulu_control::{Command, Console, ControlApi, ControlClient};

use crate::cli::output::{
    format_drive_status, format_version_info, print_events, print_formatted, print_success,
    OutputFormat,
};

#[derive(Serialize)]
struct ImageList {
    images: Vec<String>,
}

pub async fn status(client: &ControlClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;
    print_formatted(&status, format, format_drive_status);
    Ok(())
}

pub async fn eject(client: &ControlClient, quiet: bool) -> Result<()> {
    let reply = client.eject().await?;
    if !reply.is_ok() {
        bail!("Eject failed.");
    }
    print_success("Ejected.", quiet);
    Ok(())
}

pub async fn mount(client: &ControlClient, filename: &str, quiet: bool) -> Result<()> {
    let reply = client.mount(filename).await?;
    if !reply.is_ok() {
        bail!("Select failed.");
    }
    print_success(&format!("Mounted {}", filename), quiet);
    Ok(())
}

pub async fn version(client: &ControlClient, format: OutputFormat) -> Result<()> {
    let info = client.version().await?;
    print_formatted(&info, format, format_version_info);
    Ok(())
}

/// Run one browse session through the console and print the listing.
pub async fn images(client: Arc<ControlClient>, config: &Config, format: OutputFormat) -> Result<()> {
    let mut console = Console::new(client, config);
    let mut events = console.dispatch(Command::Browse);

    loop {
        if events.iter().any(|e| matches!(e, StateEvent::CatalogReady { .. })) {
            break;
        }
        if events.contains(&StateEvent::ReturnToStatus) {
            let reason = events
                .iter()
                .find_map(|e| match e {
                    StateEvent::StatusMessage(message) | StateEvent::Alert(message) => {
                        Some(message.as_str())
                    }
                    _ => None,
                })
                .unwrap_or("enumeration ended");
            bail!("Could not list images: {}", reason);
        }

        events = match console.next().await {
            Some(events) => events,
            None => bail!("Console stopped before the listing completed"),
        };
    }

    let list = ImageList {
        images: console
            .catalog()
            .images()
            .iter()
            .map(|image| image.filename.clone())
            .collect(),
    };
    if console.catalog().rejected() > 0 {
        tracing::warn!(
            "Skipped {} malformed listing entries",
            console.catalog().rejected()
        );
    }
    print_formatted(&list, format, |l| {
        if l.images.is_empty() {
            "No images available.".to_string()
        } else {
            l.images.join("\n")
        }
    });
    Ok(())
}

/// Start the console with auto-refresh and print every status change until Ctrl+C.
pub async fn watch(
    client: Arc<ControlClient>,
    config: &Config,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let mut console = Console::new(client, config);
    console.start();
    console.dispatch(Command::AutoRefresh(true));
    print_success(
        &format!(
            "Watching drive status every {}s. Press Ctrl+C to stop.",
            config.timing.auto_refresh_period().as_secs()
        ),
        quiet,
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!("Interrupted, stopping watch");
                break;
            }
            events = console.next() => match events {
                Some(events) => print_events(&events, &console.display(), format, quiet),
                None => break,
            },
        }
    }

    console.dispatch(Command::AutoRefresh(false));
    Ok(())
}
