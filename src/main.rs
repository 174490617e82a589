//
// main.rs
// dicom-ai-randomize
//
// Entry point: sets up logging on stderr and hands argument parsing and dispatch to the CLI layer.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom_ai_randomize::cli;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run()
}
