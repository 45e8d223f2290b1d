//! Hostwatch daemon binary

use hostwatch_server::{Config, HostwatchServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // An explicit settings path wins over the search path
    let loaded = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    };

    // Can't use tracing yet - not initialized
    let yaml_config = match loaded {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            None
        }
    };

    let config = yaml_config.unwrap_or_default();
    common::logging::init_with_format(config.log_level(), config.logging.format.as_deref());

    tracing::info!("Hostwatch server starting");

    let server = HostwatchServer::new(config.to_server_config());
    server.run().await?;

    Ok(())
}
