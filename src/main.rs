//! mdns-bridge CLI entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mdns_bridge::bridge::{MdnsBridge, SharedState};
use mdns_bridge::config::Config;

/// mDNS bridge - bridges mDNS packets between network segments.
#[derive(Parser, Debug)]
#[command(name = mdns_bridge::PACKAGE)]
#[command(version)]
#[command(about = "A filtering mDNS bridge")]
#[command(
    long_about = "Bridges mDNS packets between network interfaces on distinct L2 segments, \
                  enabling service discovery across segments that cannot natively exchange \
                  link-local multicast. Queries and records can be filtered by domain-name \
                  fragments, globally and per interface."
)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config", default_value = "mdns-bridge.yaml")]
    config: PathBuf,

    /// Warn about dropped records and queries of unsupported types.
    #[arg(short = 'w', long)]
    warn: bool,

    /// Log the effective configuration at startup.
    #[arg(short = 'd', long)]
    dump_config: bool,
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging();

    let config = Config::from_yaml_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let resolved = config.resolve().context("Invalid configuration")?;

    let shared =
        SharedState::initialize(resolved, args.warn).context("Bridge initialization failed")?;
    if args.dump_config {
        shared.dump();
    }

    info!("{} starting", mdns_bridge::PACKAGE);
    let bridge = MdnsBridge::new(shared);
    bridge.run().await?;

    Ok(())
}
