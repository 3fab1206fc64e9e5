//! `sondear` binary entrypoint

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sondear::cli::{self, Cli};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    if let Err(err) = cli::entrypoint(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
