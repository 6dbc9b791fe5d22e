// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use souk_mock::config::MockConfig;

#[derive(Parser)]
#[command(name = "souk-mock", version, about = "In-memory marketplace API for local testing")]
struct Cli {
    #[command(flatten)]
    config: MockConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = souk_mock::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
