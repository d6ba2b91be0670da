/// Database configuration and connection management
pub mod database;

/// Parking lot seeding from config.toml
pub mod lots;

/// Scheduler settings from environment variables
pub mod scheduler;

/// Admin account bootstrap from environment variables
pub mod users;
