use std::path::PathBuf;

use ::tracing::error;
use clap::Parser;
use service::Service;

mod auth;
mod config;
mod http_objects;
mod routes;
mod service;
mod tracing;
use tracing::setup_tracing;

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = setup_tracing() {
        eprintln!("Error setting up tracing: {:?}", err);
        std::process::exit(1);
    }

    let config = match config::ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading config: {:?}", err);
            std::process::exit(1);
        }
    };

    let service = match Service::new(config) {
        Ok(service) => service,
        Err(err) => {
            error!("Error creating service: {:?}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = service.start().await {
        error!("Error starting service: {:?}", err);
        std::process::exit(1);
    }
}
