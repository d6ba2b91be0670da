//! Unified error type for the parking service.
//!
//! Every booking-lifecycle failure is an expected, per-request condition and is
//! returned as a value. Callers at the transport layer map these variants onto
//! their own responses.

use thiserror::Error;

/// Errors returned by every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A field failed validation
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Which field and why
        message: String,
    },

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable missing or not unicode
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// No lot with this ID
    #[error("Parking lot {lot_id} not found")]
    LotNotFound {
        /// Requested lot
        lot_id: i64,
    },

    /// No spot with this ID
    #[error("Parking spot {spot_id} not found")]
    SpotNotFound {
        /// Requested spot
        spot_id: i64,
    },

    /// No user with this ID
    #[error("User {user_id} not found")]
    UserNotFound {
        /// Requested user
        user_id: i64,
    },

    /// Spot count outside `1..=1000`
    #[error("Number of spots must be between 1 and 1000, got {count}")]
    InvalidCount {
        /// Rejected count
        count: i64,
    },

    /// Hourly rate that is not a positive finite amount
    #[error("Hourly rate must be a positive amount, got {rate}")]
    InvalidRate {
        /// Rejected rate
        rate: f64,
    },

    /// Every spot of the lot is occupied
    #[error("No available spots in parking lot {lot_id}")]
    NoSpotAvailable {
        /// Full lot
        lot_id: i64,
    },

    /// The user must release their current reservation before booking again
    #[error(
        "User {user_id} already has an active reservation at {lot_name} (spot {spot_label}); release it first"
    )]
    UserAlreadyHasActiveReservation {
        /// User trying to book
        user_id: i64,
        /// Lot of the existing reservation
        lot_name: String,
        /// Spot of the existing reservation
        spot_label: String,
    },

    /// No reservation with this ID
    #[error("Reservation {reservation_id} not found")]
    ReservationNotFound {
        /// Requested reservation
        reservation_id: i64,
    },

    /// The reservation belongs to another user
    #[error("User {user_id} is not allowed to access reservation {reservation_id}")]
    Unauthorized {
        /// Reservation being accessed
        reservation_id: i64,
        /// User who tried
        user_id: i64,
    },

    /// The reservation was already completed or cancelled
    #[error("Reservation {reservation_id} is not active")]
    ReservationNotActive {
        /// Reservation being released
        reservation_id: i64,
    },

    /// Lots with parked vehicles cannot be deleted
    #[error("Cannot delete parking lot {lot_id}: {occupied} spots are still occupied")]
    LotHasOccupiedSpots {
        /// Lot being deleted
        lot_id: i64,
        /// Spots still occupied
        occupied: u64,
    },

    /// The job worker has stopped
    #[error("Job queue is closed")]
    JobQueueClosed,
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
