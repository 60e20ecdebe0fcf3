// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ocrmd: scanned book to structured Markdown
//
// Entry point. Parses the command line, initialises logging, loads the book
// configuration, and runs the requested stages.

mod cli;
mod services;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use services::runner::BookRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ocrmd starting");

    let config = cli.load_config()?;
    let range = cli.page_range()?;
    let runner = BookRunner::new(config, &cli.output_dir, cli.quiet);
    runner.cancel_on_interrupt();
    runner.run(cli.command, range).await
}
