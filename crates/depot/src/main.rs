//! depot CLI entry point.

use clap::Parser;
use depot::tracing::{TracingConfig, init_tracing};
use depot::{Cli, execute, render};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        filter: None,
    })?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let output = execute(&cli, cancel).await?;
    render(&output, cli.json)
}
