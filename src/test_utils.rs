//! Shared test utilities for `ParkingBuddy`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        lot::{self, NewLot},
        user::{self, NewUser},
    },
    entities,
    errors::Result,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tempfile::TempDir;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool is pinned to one connection: every in-memory connection is its own
/// database, and concurrent tests must all see the same one.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed database in a fresh temporary directory, pooled over
/// `max_connections` connections so concurrent tests contend for real locks.
///
/// The database lives as long as the returned [`TempDir`].
pub async fn setup_file_db(max_connections: u32) -> Result<(TempDir, DatabaseConnection)> {
    let dir = tempfile::tempdir()?;
    let db = Database::connect(file_db_options(&dir, max_connections)).await?;
    crate::config::database::create_tables(&db).await?;
    Ok((dir, db))
}

/// Connection options for the database file inside `dir`.
pub fn file_db_options(dir: &TempDir, max_connections: u32) -> ConnectOptions {
    let path = dir.path().join("parking_buddy.sqlite");
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options.max_connections(max_connections).min_connections(1);
    options
}

/// Builds lot input with a placeholder address.
pub fn new_lot(name: &str, price_per_hour: f64, number_of_spots: i64) -> NewLot {
    NewLot {
        name: name.to_string(),
        price_per_hour,
        address: "1 Test Street".to_string(),
        pin_code: "100001".to_string(),
        number_of_spots,
        description: None,
    }
}

/// Creates a test lot with sensible defaults.
///
/// # Defaults
/// * `price_per_hour`: 10.0
/// * `number_of_spots`: 10
pub async fn create_test_lot(
    db: &DatabaseConnection,
    name: &str,
) -> Result<entities::parking_lot::Model> {
    create_custom_lot(db, name, 10.0, 10).await
}

/// Creates a test lot with a custom rate and spot count.
pub async fn create_custom_lot(
    db: &DatabaseConnection,
    name: &str,
    price_per_hour: f64,
    number_of_spots: i64,
) -> Result<entities::parking_lot::Model> {
    Ok(lot::create_lot(db, new_lot(name, price_per_hour, number_of_spots))
        .await?
        .lot)
}

/// Creates a regular (non-admin) test user.
///
/// The email is derived from the username so repeated calls with distinct
/// usernames never collide.
pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
) -> Result<entities::user::Model> {
    user::create_user(
        db,
        NewUser {
            username: username.to_string(),
            email: format!("{username}@parking.test"),
            password_hash: "test-hash".to_string(),
            phone_number: None,
        },
    )
    .await
}

/// Sets up a complete test environment with one lot.
/// Returns (db, lot) for common test scenarios.
pub async fn setup_with_lot(
    number_of_spots: i64,
) -> Result<(DatabaseConnection, entities::parking_lot::Model)> {
    let db = setup_test_db().await?;
    let lot = create_custom_lot(&db, "Test Lot", 10.0, number_of_spots).await?;
    Ok((db, lot))
}

/// Sets up a test environment with one lot and one user.
/// Returns (db, lot, user) for booking tests.
pub async fn setup_with_lot_and_user(
    number_of_spots: i64,
) -> Result<(
    DatabaseConnection,
    entities::parking_lot::Model,
    entities::user::Model,
)> {
    let (db, lot) = setup_with_lot(number_of_spots).await?;
    let user = create_test_user(&db, "test_user").await?;
    Ok((db, lot, user))
}
