mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr so --json output on stdout stays parseable
    let default_filter = if cli.output.verbose {
        "zulu_control=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting zulu-control {}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}
