//! Symbiosis console.
//!
//! A line-oriented front end for the memory pipeline: restores the last
//! conversation from the memory store, then answers one utterance per line.
//!
//! ```bash
//! cargo run -p symbiosis -- --config symbiosis.toml --question-mode
//! ```

mod console;

use console::ConsoleOptions;
use openrouter::OpenRouter;
use std::sync::Arc;
use std::time::Duration;
use symbiosis_core::config::ENV_API_KEY;
use symbiosis_core::{HttpMemoryStore, Pipeline, PipelineConfig, SymbiosisConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let options = ConsoleOptions::from_args(&args);

    if options.help {
        print_help();
        return Ok(());
    }

    let mut config = SymbiosisConfig::load_or_default(&options.config_path);
    config.apply_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let credential = match std::env::var(ENV_API_KEY) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("Error: {ENV_API_KEY} environment variable not set.");
            eprintln!("Please set it in .env file or with: export {ENV_API_KEY}=your_key_here");
            std::process::exit(1);
        }
    };

    let endpoint = match config.memory_endpoint() {
        Ok(url) => url.to_string(),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Set [memory] endpoint in {} or SYMBIOSIS_MEMORY_URL.", options.config_path.display());
            std::process::exit(1);
        }
    };

    let generator = Arc::new(
        OpenRouter::with_timeout(Duration::from_secs(config.generation.request_timeout_secs))?
            .with_base_url(&config.generation.base_url)
            .with_title(&config.generation.app_title),
    );
    let store = Arc::new(HttpMemoryStore::new(
        endpoint,
        Duration::from_secs(config.memory.request_timeout_secs),
    )?);
    let pipeline = Pipeline::new(generator, store, PipelineConfig::from(&config));

    tracing::info!("Starting Symbiosis v{}", env!("CARGO_PKG_VERSION"));
    console::run_console(&pipeline, &config, credential, options).await?;

    pipeline.flush().await;
    Ok(())
}

fn print_help() {
    println!("Symbiosis - a companion that remembers");
    println!();
    println!("Usage: symbiosis [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <path>   Configuration file (default: symbiosis.toml)");
    println!("  --question-mode   Start in interrogation mode");
    println!("  --json            Print the raw reply envelope");
    println!("  -h, --help        Show this help");
    println!();
    println!("Environment:");
    println!("  OPENROUTER_API_KEY     Generation service credential (required)");
    println!("  SYMBIOSIS_MEMORY_URL   Memory store endpoint");
    println!("  SYMBIOSIS_HIGH_MODEL   Model for analysis and replies");
    println!("  SYMBIOSIS_LOW_MODEL    Model for relationship expansion");
    println!("  SYMBIOSIS_IDENTITY     Who \"I\" refers to");
    println!("  RUST_LOG               Log filter (overrides [logging] level)");
}
