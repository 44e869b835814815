//! CLI module for zulu-control
//!
//! One-shot commands talk to the service directly; `watch` and `shell` run the
//! console event loop.

mod commands;
mod output;
mod shell;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use zulu_control::config::Config;
use zulu_control::ControlClient;

pub use output::OutputFormat;

/// zulu-control - ZuluIDE virtual CD-ROM control
#[derive(Parser, Debug)]
#[command(name = "zulu-control")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Service base URL, overriding the configured one
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the drive role and mounted image
    Status,

    /// Eject the mounted image
    Eject,

    /// Mount an image by filename
    Mount {
        /// Image filename as listed by `images`
        filename: String,
    },

    /// List the images the service can mount
    Images,

    /// Show client and server API versions
    Version,

    /// Follow the drive status with auto-refresh until interrupted
    Watch,

    /// Start the interactive console
    Shell,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> Result<()> {
    let format = cli.output.format();
    let quiet = cli.output.quiet;
    let url = cli.output.url;

    match cli.command {
        Commands::Status => commands::drive::status(&connect(url)?.1, format).await,
        Commands::Eject => commands::drive::eject(&connect(url)?.1, quiet).await,
        Commands::Mount { filename } => {
            commands::drive::mount(&connect(url)?.1, &filename, quiet).await
        }
        Commands::Images => {
            let (config, client) = connect(url)?;
            commands::drive::images(client, &config, format).await
        }
        Commands::Version => commands::drive::version(&connect(url)?.1, format).await,
        Commands::Watch => {
            let (config, client) = connect(url)?;
            commands::drive::watch(client, &config, format, quiet).await
        }
        Commands::Shell => {
            let (config, client) = connect(url)?;
            shell::run(client, &config).await
        }
        // Works without a reachable service
        Commands::Config { command } => commands::config::run(command, format, quiet).await,
    }
}

/// Load the configuration and build the service client.
fn connect(url: Option<String>) -> Result<(Config, Arc<ControlClient>)> {
    let mut config = Config::load()?;
    let client = client_for(&mut config, url)?;
    Ok((config, client))
}

/// Apply `--url` to `config` and build the client it describes.
fn client_for(config: &mut Config, url: Option<String>) -> Result<Arc<ControlClient>> {
    if let Some(url) = url {
        config.service.base_url = url;
    }
    let client = ControlClient::new(&config.service.base_url, config.service.request_timeout())?;
    tracing::debug!("Using service at {}", client.base_url());
    Ok(Arc::new(client))
}
