//! Parking lot business logic - Lot inventory management.
//!
//! Creating a lot generates its spots in the same database transaction, so a lot
//! never exists with fewer spots than `number_of_spots`. Deleting a lot is refused
//! while any of its spots is occupied and otherwise removes the lot together with
//! its spots and their reservation history.

use crate::{
    config::database,
    core::spot,
    entities::{ParkingLot, ParkingSpot, Reservation, parking_lot, parking_spot, reservation},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Input for creating a lot.
#[derive(Debug, Clone)]
pub struct NewLot {
    /// Display name
    pub name: String,
    /// Hourly rate, must be positive
    pub price_per_hour: f64,
    /// Street address
    pub address: String,
    /// Postal pin code
    pub pin_code: String,
    /// Number of spots to generate, `1..=1000`
    pub number_of_spots: i64,
    /// Optional description
    pub description: Option<String>,
}

/// Partial update of a lot. `None` fields are left untouched.
///
/// The spot count cannot be changed after creation.
#[derive(Debug, Clone, Default)]
pub struct LotChanges {
    /// New display name
    pub name: Option<String>,
    /// New hourly rate
    pub price_per_hour: Option<f64>,
    /// New address
    pub address: Option<String>,
    /// New pin code
    pub pin_code: Option<String>,
    /// New description
    pub description: Option<String>,
}

/// A freshly created lot and the labels of its generated spots.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedLot {
    /// The stored lot
    pub lot: parking_lot::Model,
    /// Spot labels in creation order
    pub spot_labels: Vec<String>,
}

/// A lot together with its live occupancy counts.
#[derive(Debug, Clone, Serialize)]
pub struct LotAvailability {
    /// The lot
    pub lot: parking_lot::Model,
    /// All spots in the lot
    pub total_spots: u64,
    /// Spots free to book
    pub available_spots: u64,
    /// Spots bound to an active reservation
    pub occupied_spots: u64,
}

/// Summary of a completed lot deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedLot {
    /// ID of the removed lot
    pub lot_id: i64,
    /// Name of the removed lot
    pub name: String,
    /// Spots removed with the lot
    pub spots_removed: u64,
    /// Historical reservations removed with the spots
    pub reservations_removed: u64,
}

/// Checks that an hourly rate is a positive, finite amount.
pub fn validate_rate(rate: f64) -> Result<()> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(Error::InvalidRate { rate });
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput {
            message: "Parking lot name cannot be empty".to_string(),
        });
    }
    Ok(())
}

/// Creates a lot and generates its spots.
///
/// # Errors
/// Returns an error if:
/// - The name is empty or whitespace-only (`InvalidInput`)
/// - The hourly rate is not a positive, finite amount (`InvalidRate`)
/// - The spot count is outside `1..=1000` (`InvalidCount`)
/// - A database operation fails; nothing is stored in that case
pub async fn create_lot(db: &DatabaseConnection, new_lot: NewLot) -> Result<CreatedLot> {
    create_lot_at(db, new_lot, Utc::now()).await
}

/// Same as [`create_lot`] with an explicit creation time.
#[instrument(skip(db))]
pub async fn create_lot_at(
    db: &DatabaseConnection,
    new_lot: NewLot,
    now: DateTime<Utc>,
) -> Result<CreatedLot> {
    validate_name(&new_lot.name)?;
    validate_rate(new_lot.price_per_hour)?;
    spot::validate_spot_count(new_lot.number_of_spots)?;

    let number_of_spots =
        i32::try_from(new_lot.number_of_spots).map_err(|_| Error::InvalidCount {
            count: new_lot.number_of_spots,
        })?;

    let txn = database::begin_write(db).await?;

    let lot = parking_lot::ActiveModel {
        name: Set(new_lot.name.trim().to_string()),
        price_per_hour: Set(new_lot.price_per_hour),
        address: Set(new_lot.address),
        pin_code: Set(new_lot.pin_code),
        number_of_spots: Set(number_of_spots),
        description: Set(new_lot.description),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let spot_labels = spot::create_spots(&txn, lot.id, new_lot.number_of_spots, now).await?;

    txn.commit().await?;

    info!(
        "Created parking lot '{}' (ID: {}) with {} spots",
        lot.name,
        lot.id,
        spot_labels.len()
    );
    Ok(CreatedLot { lot, spot_labels })
}

/// Retrieves a lot by its unique ID.
pub async fn get_lot<C>(conn: &C, lot_id: i64) -> Result<Option<parking_lot::Model>>
where
    C: ConnectionTrait,
{
    ParkingLot::find_by_id(lot_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Retrieves a lot by ID, failing with `LotNotFound` if it does not exist.
pub async fn require_lot<C>(conn: &C, lot_id: i64) -> Result<parking_lot::Model>
where
    C: ConnectionTrait,
{
    get_lot(conn, lot_id)
        .await?
        .ok_or(Error::LotNotFound { lot_id })
}

/// Finds a lot by its display name.
pub async fn get_lot_by_name<C>(conn: &C, name: &str) -> Result<Option<parking_lot::Model>>
where
    C: ConnectionTrait,
{
    ParkingLot::find()
        .filter(parking_lot::Column::Name.eq(name))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists every lot, ordered alphabetically by name.
pub async fn list_lots(db: &DatabaseConnection) -> Result<Vec<parking_lot::Model>> {
    ParkingLot::find()
        .order_by_asc(parking_lot::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists every lot with its live spot counts.
pub async fn lot_availability(db: &DatabaseConnection) -> Result<Vec<LotAvailability>> {
    let lots = list_lots(db).await?;
    let mut result = Vec::with_capacity(lots.len());

    for lot in lots {
        let available_spots = spot::available_count(db, lot.id).await?;
        let occupied_spots = spot::occupied_count(db, lot.id).await?;
        result.push(LotAvailability {
            total_spots: available_spots + occupied_spots,
            available_spots,
            occupied_spots,
            lot,
        });
    }

    Ok(result)
}

/// Lists the lots that still have at least one free spot.
///
/// This is what a user browses before booking.
pub async fn available_lots(db: &DatabaseConnection) -> Result<Vec<LotAvailability>> {
    Ok(lot_availability(db)
        .await?
        .into_iter()
        .filter(|entry| entry.available_spots > 0)
        .collect())
}

/// Applies a partial update to a lot and refreshes its `updated_at`.
///
/// # Errors
/// Returns `LotNotFound` for an unknown lot, `InvalidRate` or `InvalidInput` for
/// invalid new values.
#[instrument(skip(db))]
pub async fn update_lot(
    db: &DatabaseConnection,
    lot_id: i64,
    changes: LotChanges,
) -> Result<parking_lot::Model> {
    if let Some(name) = &changes.name {
        validate_name(name)?;
    }
    if let Some(rate) = changes.price_per_hour {
        validate_rate(rate)?;
    }

    let lot = require_lot(db, lot_id).await?;
    let mut active_model: parking_lot::ActiveModel = lot.into();

    if let Some(name) = changes.name {
        active_model.name = Set(name.trim().to_string());
    }
    if let Some(rate) = changes.price_per_hour {
        active_model.price_per_hour = Set(rate);
    }
    if let Some(address) = changes.address {
        active_model.address = Set(address);
    }
    if let Some(pin_code) = changes.pin_code {
        active_model.pin_code = Set(pin_code);
    }
    if let Some(description) = changes.description {
        active_model.description = Set(Some(description));
    }
    active_model.updated_at = Set(Utc::now());

    let updated = active_model.update(db).await?;
    info!("Updated parking lot '{}' (ID: {})", updated.name, updated.id);
    Ok(updated)
}

/// Deletes a lot with all of its spots and their reservation history.
///
/// The occupancy check and the deletes run in one transaction.
///
/// # Errors
/// Returns `LotNotFound` for an unknown lot and `LotHasOccupiedSpots` while any
/// spot of the lot is occupied.
#[instrument(skip(db))]
pub async fn delete_lot(db: &DatabaseConnection, lot_id: i64) -> Result<DeletedLot> {
    let txn = database::begin_write(db).await?;

    let lot = require_lot(&txn, lot_id).await?;

    let occupied = spot::occupied_count(&txn, lot_id).await?;
    if occupied > 0 {
        warn!(
            "Refusing to delete parking lot '{}' (ID: {}): {} spots occupied",
            lot.name, lot_id, occupied
        );
        return Err(Error::LotHasOccupiedSpots { lot_id, occupied });
    }

    let spot_ids: Vec<i64> = ParkingSpot::find()
        .select_only()
        .column(parking_spot::Column::Id)
        .filter(parking_spot::Column::LotId.eq(lot_id))
        .into_tuple()
        .all(&txn)
        .await?;

    let reservations_removed = Reservation::delete_many()
        .filter(reservation::Column::SpotId.is_in(spot_ids))
        .exec(&txn)
        .await?
        .rows_affected;

    let spots_removed = ParkingSpot::delete_many()
        .filter(parking_spot::Column::LotId.eq(lot_id))
        .exec(&txn)
        .await?
        .rows_affected;

    ParkingLot::delete_by_id(lot_id).exec(&txn).await?;

    txn.commit().await?;

    info!(
        "Deleted parking lot '{}' (ID: {}): {} spots, {} reservations removed",
        lot.name, lot_id, spots_removed, reservations_removed
    );
    Ok(DeletedLot {
        lot_id,
        name: lot.name,
        spots_removed,
        reservations_removed,
    })
}

/// Creates the configured lots that do not exist yet, matched by name.
///
/// Returns how many lots were created.
#[instrument(skip(db, lots))]
pub async fn seed_lots(db: &DatabaseConnection, lots: Vec<NewLot>) -> Result<usize> {
    info!("Seeding parking lots. Found {} configurations.", lots.len());
    let mut created = 0;

    for new_lot in lots {
        if get_lot_by_name(db, new_lot.name.trim()).await?.is_some() {
            warn!("Parking lot '{}' already exists. Skipping.", new_lot.name);
            continue;
        }
        create_lot(db, new_lot).await?;
        created += 1;
    }

    info!("Finished seeding parking lots: {} created.", created);
    Ok(created)
}
