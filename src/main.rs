// tuxd - Main Entry Point
//
// Web control gateway for rooted Android devices running Termux: loads the
// environment-derived configuration, opens the audit trail, mounts built-in
// and drop-in command modules, and serves the authenticated HTTP API.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tuxd::config::Config;
use tuxd::context::AppContext;
use tuxd::server;

/// tuxd: web control gateway for rooted Android devices
#[derive(Parser, Debug)]
#[command(name = "tuxd")]
#[command(version = "0.1.0")]
#[command(about = "Control a rooted Termux device over an authenticated HTTP API", long_about = None)]
struct Args {
    /// Reject state-changing and privileged routes regardless of PIN
    #[arg(long)]
    readonly: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .init();

    let mut config = Config::from_env()?;
    config.readonly = config.readonly || args.readonly;

    let ctx = AppContext::bootstrap(config)?;
    server::serve(ctx).await
}
