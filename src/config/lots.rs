//! Parking lot seed configuration loaded from config.toml
//!
//! Lots listed in the configuration file are created on startup when no lot
//! with the same name exists yet. Spots are generated from `number_of_spots`.

use crate::core::lot::NewLot;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Lots to seed
    #[serde(default)]
    pub lots: Vec<LotConfig>,
}

/// Configuration for a single parking lot
#[derive(Debug, Deserialize, Clone)]
pub struct LotConfig {
    /// Display name of the lot
    pub name: String,
    /// Hourly rate
    pub price_per_hour: f64,
    /// Street address
    pub address: String,
    /// Postal pin code
    pub pin_code: String,
    /// How many spots to generate
    pub number_of_spots: i64,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

impl From<LotConfig> for NewLot {
    fn from(value: LotConfig) -> Self {
        Self {
            name: value.name,
            price_per_hour: value.price_per_hour,
            address: value.address,
            pin_code: value.pin_code,
            number_of_spots: value.number_of_spots,
            description: value.description,
        }
    }
}

/// Loads lot configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads lot configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<Config> {
    load_config("config.toml")
}
