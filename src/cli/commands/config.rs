//! Configuration management commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{print_formatted, print_success, OutputFormat};
use zulu_control::config::Config;
use zulu_control::ControlClient;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Get a specific config value
    Get {
        /// Config key (e.g., "service.base_url", "timing.auto_refresh_secs")
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., "service.base_url", "timing.auto_refresh_secs")
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}

#[derive(Serialize)]
struct ConfigPathResult {
    path: String,
    exists: bool,
}

pub async fn run(command: ConfigCommands, format: OutputFormat, quiet: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(format).await,
        ConfigCommands::Get { key } => get(&key, format).await,
        ConfigCommands::Set { key, value } => set(&key, &value, quiet).await,
        ConfigCommands::Path => path(format).await,
    }
}

async fn show(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

async fn get(key: &str, format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    // Parse dotted key path and extract value
    let value = get_config_value(&config, key)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&value)?);
        }
        OutputFormat::Text => {
            println!("{}", value);
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["service", "base_url"] => Ok(config.service.base_url.clone()),
        ["service", "request_timeout_secs"] => Ok(config
            .service
            .request_timeout_secs
            .map(|secs| secs.to_string())
            .unwrap_or_else(|| "<not set>".to_string())),
        ["timing", "settle_delay_ms"] => Ok(config.timing.settle_delay_ms.to_string()),
        ["timing", "auto_refresh_secs"] => Ok(config.timing.auto_refresh_secs.to_string()),
        ["timing", "version_delay_ms"] => Ok(config.timing.version_delay_ms.to_string()),
        ["timing", "enumeration_backoff_ms"] => {
            Ok(config.timing.enumeration_backoff_ms.to_string())
        }
        ["catalog", "strategy"] => Ok(config.catalog.strategy.to_string()),
        ["catalog", "max_consecutive_waits"] => {
            Ok(config.catalog.max_consecutive_waits.to_string())
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
}

async fn set(key: &str, value: &str, quiet: bool) -> Result<()> {
    let mut config = Config::load()?;

    set_config_value(&mut config, key, value)?;
    config.save()?;

    print_success(&format!("Set {} = {}", key, value), quiet);
    Ok(())
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["service", "base_url"] => {
            // Reject URLs the client could not use
            ControlClient::new(value, None)?;
            config.service.base_url = value.to_string();
        }
        ["service", "request_timeout_secs"] => {
            config.service.request_timeout_secs = match value {
                "" | "none" => None,
                secs => Some(secs.parse()?),
            };
        }
        ["timing", "settle_delay_ms"] => {
            config.timing.settle_delay_ms = value.parse()?;
        }
        ["timing", "auto_refresh_secs"] => {
            config.timing.auto_refresh_secs = value.parse()?;
        }
        ["timing", "version_delay_ms"] => {
            config.timing.version_delay_ms = value.parse()?;
        }
        ["timing", "enumeration_backoff_ms"] => {
            config.timing.enumeration_backoff_ms = value.parse()?;
        }
        ["catalog", "strategy"] => {
            config.catalog.strategy = value.parse()?;
        }
        ["catalog", "max_consecutive_waits"] => {
            config.catalog.max_consecutive_waits = value.parse()?;
        }
        _ => anyhow::bail!("Unknown or read-only config key: {}", key),
    }

    Ok(())
}

async fn path(format: OutputFormat) -> Result<()> {
    let path = Config::config_path()?;
    let exists = path.exists();

    let result = ConfigPathResult {
        path: path.to_string_lossy().to_string(),
        exists,
    };

    print_formatted(&result, format, |r| {
        format!("{}{}", r.path, if r.exists { "" } else { " (not found)" })
    });

    Ok(())
}
