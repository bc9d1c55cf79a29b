//! rectangle-bridge - drive the Rectangle window manager from the command line

use clap::Parser;
use rectangle_bridge::{
    cli::{run_cli, BridgeCli},
    logging::{init_logging, LogConfig},
};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = BridgeCli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from_env()
    };
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run_cli(cli).await {
        error!("Command failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
