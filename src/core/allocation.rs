//! Allocation engine - Booking and releasing spots.
//!
//! Both operations run as one database transaction each. Booking claims a spot
//! with a conditional update and inserts the reservation; releasing completes
//! the reservation with a conditional update and frees the spot. Any error
//! drops the transaction, so no half-finished booking or release is ever
//! visible.
//!
//! Transactions take the `SQLite` write lock with their first statement, so
//! concurrent callers queue instead of failing on a lock upgrade. If the lock
//! still cannot be had after a few attempts, the error is resolved against the
//! committed state: a booking that lost to another one reports
//! `UserAlreadyHasActiveReservation` or `NoSpotAvailable`, and a release that
//! lost reports `ReservationNotActive`.
//!
//! `book_spot` is not idempotent: retrying after a lost response may book again
//! if the first attempt succeeded. Callers that retry should check
//! [`reservation::active_reservation_for_user`] first.

use crate::{
    config::database,
    core::{billing, lot, reservation, spot, user},
    entities::{ReservationStatus, parking_spot},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, prelude::*};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// How many free spots a booking tries before giving up on a busy lot.
const MAX_CLAIM_ATTEMPTS: usize = 8;
/// Attempts per operation while `SQLite` reports lock contention.
const MAX_BUSY_ATTEMPTS: u32 = 3;
/// Pause before the next attempt, multiplied by the attempt number.
const BUSY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(50);

/// A successful booking.
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    /// The new active reservation
    pub reservation: crate::entities::reservation::Model,
    /// Lot the spot belongs to
    pub lot_id: i64,
    /// Lot display name
    pub lot_name: String,
    /// Assigned spot
    pub spot_id: i64,
    /// Assigned spot label, e.g. `A-01`
    pub spot_label: String,
    /// Hourly rate at booking time
    pub price_per_hour: f64,
    /// When the stay started
    pub check_in: DateTime<Utc>,
}

/// The bill for a released spot.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    /// Completed reservation
    pub reservation_id: i64,
    /// Lot display name
    pub lot_name: String,
    /// Released spot label
    pub spot_label: String,
    /// Vehicle registration number, if one was given
    pub vehicle_number: Option<String>,
    /// When the stay started
    pub check_in: DateTime<Utc>,
    /// When the spot was released
    pub check_out: DateTime<Utc>,
    /// Actual stay length in hours, two decimals
    pub duration_hours: f64,
    /// Hourly rate applied
    pub price_per_hour: f64,
    /// Amount charged
    pub total_cost: f64,
}

/// Books the first free spot of a lot for a user, checking in now.
///
/// # Errors
/// Returns an error if:
/// - The lot does not exist (`LotNotFound`)
/// - The user does not exist (`UserNotFound`)
/// - The user already has an active reservation in any lot
///   (`UserAlreadyHasActiveReservation`)
/// - Every spot of the lot is occupied (`NoSpotAvailable`)
/// - A database operation fails
pub async fn book_spot(
    db: &DatabaseConnection,
    lot_id: i64,
    user_id: i64,
    vehicle_number: Option<String>,
) -> Result<Booking> {
    book_spot_at(db, lot_id, user_id, vehicle_number, Utc::now()).await
}

/// Same as [`book_spot`] with an explicit check-in time.
#[instrument(skip(db))]
pub async fn book_spot_at(
    db: &DatabaseConnection,
    lot_id: i64,
    user_id: i64,
    vehicle_number: Option<String>,
    now: DateTime<Utc>,
) -> Result<Booking> {
    let mut attempt = 1;
    loop {
        match try_book(db, lot_id, user_id, vehicle_number.clone(), now).await {
            Err(Error::Database(err)) if database::is_busy(&err) => {
                if attempt == MAX_BUSY_ATTEMPTS {
                    return Err(contended_booking_error(db, lot_id, user_id, err)
                        .await
                        .unwrap_or_else(std::convert::identity));
                }
                warn!(
                    "Booking in lot {} by user {} hit lock contention (attempt {})",
                    lot_id, user_id, attempt
                );
                tokio::time::sleep(BUSY_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn try_book(
    db: &DatabaseConnection,
    lot_id: i64,
    user_id: i64,
    vehicle_number: Option<String>,
    now: DateTime<Utc>,
) -> Result<Booking> {
    let txn = database::begin_write(db).await?;

    let lot = lot::require_lot(&txn, lot_id).await?;
    user::require_user(&txn, user_id).await?;

    if let Some(existing) = reservation::active_reservation_for_user(&txn, user_id).await? {
        return Err(reservation::conflict_error(&txn, &existing).await?);
    }

    let spot = claim_free_spot(&txn, lot_id, now).await?;

    let created = reservation::create(&txn, spot.id, user_id, vehicle_number, now).await?;

    txn.commit().await?;

    info!(
        "User {} booked spot {} in '{}' (reservation {})",
        user_id, spot.label, lot.name, created.id
    );
    Ok(Booking {
        lot_id: lot.id,
        lot_name: lot.name,
        spot_id: spot.id,
        spot_label: spot.label,
        price_per_hour: lot.price_per_hour,
        check_in: created.check_in,
        reservation: created,
    })
}

/// Releases a user's active reservation, checking out now.
///
/// # Errors
/// Returns an error if:
/// - The reservation does not exist (`ReservationNotFound`)
/// - It belongs to another user (`Unauthorized`)
/// - It is no longer active, including when a concurrent release won
///   (`ReservationNotActive`)
/// - A database operation fails
pub async fn release_spot(
    db: &DatabaseConnection,
    reservation_id: i64,
    user_id: i64,
) -> Result<Receipt> {
    release_spot_at(db, reservation_id, user_id, Utc::now()).await
}

/// Same as [`release_spot`] with an explicit check-out time.
///
/// A check-out earlier than the check-in is clamped to the check-in.
#[instrument(skip(db))]
pub async fn release_spot_at(
    db: &DatabaseConnection,
    reservation_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Receipt> {
    let mut attempt = 1;
    loop {
        match try_release(db, reservation_id, user_id, now).await {
            Err(Error::Database(err)) if database::is_busy(&err) => {
                if attempt == MAX_BUSY_ATTEMPTS {
                    return Err(contended_release_error(db, reservation_id, err)
                        .await
                        .unwrap_or_else(std::convert::identity));
                }
                warn!(
                    "Release of reservation {} hit lock contention (attempt {})",
                    reservation_id, attempt
                );
                tokio::time::sleep(BUSY_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn try_release(
    db: &DatabaseConnection,
    reservation_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Receipt> {
    let txn = database::begin_write(db).await?;

    let existing = reservation::get_reservation(&txn, reservation_id)
        .await?
        .ok_or(Error::ReservationNotFound { reservation_id })?;

    if existing.user_id != user_id {
        warn!(
            "User {} tried to release reservation {} owned by user {}",
            user_id, reservation_id, existing.user_id
        );
        return Err(Error::Unauthorized {
            reservation_id,
            user_id,
        });
    }

    if existing.status != ReservationStatus::Active {
        return Err(Error::ReservationNotActive { reservation_id });
    }

    let spot = spot::get_spot(&txn, existing.spot_id)
        .await?
        .ok_or(Error::SpotNotFound {
            spot_id: existing.spot_id,
        })?;
    let lot = lot::require_lot(&txn, spot.lot_id).await?;

    let check_out = now.max(existing.check_in);
    let total_cost = billing::compute_cost(existing.check_in, check_out, lot.price_per_hour);

    let completed = reservation::complete(&txn, reservation_id, check_out, total_cost).await?;
    spot::mark_available(&txn, spot.id, check_out).await?;

    txn.commit().await?;

    info!(
        "User {} released spot {} in '{}' (reservation {}): ${:.2}",
        user_id, spot.label, lot.name, reservation_id, total_cost
    );
    Ok(Receipt {
        reservation_id,
        lot_name: lot.name,
        spot_label: spot.label,
        vehicle_number: completed.vehicle_number,
        check_in: completed.check_in,
        check_out,
        duration_hours: billing::round_hours(billing::duration_hours(completed.check_in, check_out)),
        price_per_hour: lot.price_per_hour,
        total_cost,
    })
}

/// Names the booking that won when this one kept losing the lock.
///
/// Falls back to the lock error itself when neither the user nor the lot has
/// changed in a way that explains the loss.
async fn contended_booking_error(
    db: &DatabaseConnection,
    lot_id: i64,
    user_id: i64,
    err: DbErr,
) -> Result<Error> {
    if let Some(existing) = reservation::active_reservation_for_user(db, user_id).await? {
        return reservation::conflict_error(db, &existing).await;
    }
    if spot::available_count(db, lot_id).await? == 0 {
        return Ok(Error::NoSpotAvailable { lot_id });
    }
    Ok(Error::Database(err))
}

/// Reports `ReservationNotActive` when the release that kept losing the lock
/// lost it to one that completed the reservation.
async fn contended_release_error(
    db: &DatabaseConnection,
    reservation_id: i64,
    err: DbErr,
) -> Result<Error> {
    Ok(match reservation::get_reservation(db, reservation_id).await? {
        None => Error::ReservationNotFound { reservation_id },
        Some(existing) if existing.status != ReservationStatus::Active => {
            Error::ReservationNotActive { reservation_id }
        }
        Some(_) => Error::Database(err),
    })
}

/// Claims the lowest-ID free spot, moving on to the next one when a concurrent
/// booking takes it first.
async fn claim_free_spot<C>(
    conn: &C,
    lot_id: i64,
    now: DateTime<Utc>,
) -> Result<parking_spot::Model>
where
    C: ConnectionTrait,
{
    for _ in 0..MAX_CLAIM_ATTEMPTS {
        let candidate = spot::find_free_spot(conn, lot_id).await?;
        if spot::try_occupy(conn, candidate.id, now).await? {
            return Ok(candidate);
        }
        debug!("Spot {} was taken concurrently, retrying", candidate.label);
    }

    Err(Error::NoSpotAvailable { lot_id })
}
