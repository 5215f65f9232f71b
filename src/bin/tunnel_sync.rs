//! Syncs every configured tunnel profile's ingress rules with the current
//! project list. Run after editing the config file.

use hookdeploy::config::Config;
use hookdeploy::ingress;
use std::path::PathBuf;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/projects.json";

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config_path = PathBuf::from(
        std::env::var("HOOKDEPLOY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if config.tunnel.profiles.is_empty() {
        eprintln!("No tunnel profiles configured in {:?}", config_path);
        std::process::exit(1);
    }

    let mut failed = false;
    for (name, profile) in &config.tunnel.profiles {
        info!("Syncing tunnel profile '{}'", name);
        if let Err(e) = ingress::sync_profile(&config, name, profile) {
            error!("Profile '{}' sync failed: {}", name, e);
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
    info!("Done.");
}
