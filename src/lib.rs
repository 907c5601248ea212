pub mod api;
pub mod certificates;
pub mod config;
pub mod http;
pub mod retry;
pub mod rotation;
pub mod services;
pub mod version;

use anyhow::{Context, Result};
use log::info;

use config::Config;
use http::ApplianceClient;
use rotation::{Rotation, RotationReport, RotationSettings};

/// Loads the config file and rotates the appliance certificate.
pub fn run() -> Result<RotationReport> {
    let config = Config::load().context("failed to load configuration")?;
    info!("[rotate] using appliance at {}", config.api_base_url);

    let client = ApplianceClient::new(&config.api_base_url, &config.api_key)?;
    Rotation::new(&client, RotationSettings::from(&config)).run()
}
