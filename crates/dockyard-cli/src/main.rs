//! dockyard command line entry point.
//!
//! Logs go to stderr; stdout carries command output only, so `dockyard ip dev`
//! and friends can be used in scripts.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod store;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("dockyard=info".parse()?)
                .add_directive("dockyard_core=info".parse()?)
                .add_directive("dockyard_cloud=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Ctrl-C aborts the running wait; create and rm still clean up and save.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received interrupt, cancelling");
            on_signal.cancel();
        }
    });

    if let Err(e) = cli.run(cancel).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}
