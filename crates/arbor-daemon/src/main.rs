//! Arbor Daemon - Main entry point
//!
//! Builds the resource tree from a system specification, starts the
//! declared services, and serves until interrupted.

mod config;

use anyhow::{Context, Result};
use arbor_core::{build_objects, Specification};
use arbor_services::build;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(about = "IoT resource tree and service registry daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "arbor.toml")]
    config: PathBuf,

    /// System specification (overrides daemon.system)
    #[arg(short, long)]
    system: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Build the object tree, print it and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Arbor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(system) = args.system {
        config.daemon.system = system;
    }

    let spec = Specification::from_file(&config.daemon.system)
        .with_context(|| format!("loading {}", config.daemon.system.display()))?;
    info!(
        system = %config.daemon.system.display(),
        services = spec.services.len(),
        objects = spec.objects.len(),
        "Specification loaded"
    );

    if args.check {
        let tree = build_objects(&spec)?;
        print!("{}", tree.render(tree.root()));
        return Ok(());
    }

    let (tree, registry) = build(&spec, &config.to_service_options()).await?;
    info!(nodes = tree.read().await.len(), "Resource tree ready");

    for service in registry.iter() {
        match &service.transport {
            Some(transport) => info!(
                service = %service.name,
                address = %transport.base_address(),
                "Serving"
            ),
            None => info!(
                service = %service.name,
                scheme = %service.descriptor.scheme,
                "Registered"
            ),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    registry.shutdown();

    Ok(())
}
