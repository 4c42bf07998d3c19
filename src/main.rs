//! Contriage - contract PDF triage and structured field extraction.
//!
//! Reduces long contract PDFs to the pages carrying legally material
//! clauses, sends the reduced document to a generative model for field
//! extraction, and flattens the result into one CSV row per document.

use contriage::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "contriage=info"
    } else {
        "contriage=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
