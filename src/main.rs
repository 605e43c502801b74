//! Main entry point for the agmarknet-ingest CLI

use agmarknet_ingest::cli::{Cli, Commands};
use agmarknet_ingest::shutdown::ShutdownCoordinator;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agmarknet_ingest=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(ref args) => {
            // Missing credential fails here, before the Ctrl+C handler or any I/O
            args.to_config(&cli)?;

            let shutdown = ShutdownCoordinator::shared();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Ctrl+C received - finishing current unit and saving progress...");
                        shutdown.request_shutdown();
                    }
                }
            });

            args.execute(&cli, shutdown).await?;
        }
        Commands::Status(ref args) => args.execute(&cli)?,
        Commands::Reset(ref args) => args.execute(&cli)?,
    }
    Ok(())
}

fn main() {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
}
