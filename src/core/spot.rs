//! Spot registry - Per-lot spot inventory and occupancy state.
//!
//! Spots are generated once, when their lot is created, with deterministic
//! section labels (`A-01` .. `A-99`, `B-01`, ..). Occupancy lives only in the
//! `status` column of each spot; every count is a live query over it.
//!
//! All functions take any [`ConnectionTrait`] so they can run either on a plain
//! connection or inside the caller's transaction.

use crate::{
    entities::{ParkingSpot, SpotStatus, parking_spot},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{debug, instrument};

/// Smallest number of spots a lot may have.
pub const MIN_SPOTS_PER_LOT: i64 = 1;
/// Largest number of spots a lot may have.
pub const MAX_SPOTS_PER_LOT: i64 = 1000;
/// Positions per lettered section; keeps every position two digits wide.
pub const SECTION_SIZE: usize = 99;
/// Vehicle class assigned to generated spots.
pub const DEFAULT_VEHICLE_TYPE: &str = "4-wheeler";

const INSERT_BATCH_SIZE: usize = 100;

/// Builds the label of the spot at zero-based `index` within its lot.
///
/// Sections are lettered from `A`; positions inside a section run `01..=99`.
/// A section never reaches a three-digit position: the 100th spot is `B-01`,
/// not `A-100`, so a 150-spot lot ends at `B-51`.
///
/// # Example
/// ```
/// use parking_buddy::core::spot::spot_label;
///
/// assert_eq!(spot_label(0), "A-01");
/// assert_eq!(spot_label(98), "A-99");
/// assert_eq!(spot_label(99), "B-01");
/// ```
#[must_use]
pub fn spot_label(index: usize) -> String {
    let section = index / SECTION_SIZE;
    let position = index % SECTION_SIZE + 1;
    let letter = u8::try_from(section)
        .ok()
        .and_then(|offset| b'A'.checked_add(offset))
        .map_or('?', char::from);
    format!("{letter}-{position:02}")
}

/// Checks that `count` is an allowed number of spots for a lot.
pub fn validate_spot_count(count: i64) -> Result<usize> {
    if !(MIN_SPOTS_PER_LOT..=MAX_SPOTS_PER_LOT).contains(&count) {
        return Err(Error::InvalidCount { count });
    }
    usize::try_from(count).map_err(|_| Error::InvalidCount { count })
}

/// Generates `count` available spots for a lot and returns their labels in order.
///
/// Run this inside the transaction that creates the lot so the lot never exists
/// without its spots.
#[instrument(skip(conn))]
pub async fn create_spots<C>(
    conn: &C,
    lot_id: i64,
    count: i64,
    now: DateTime<Utc>,
) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let count = validate_spot_count(count)?;
    let labels: Vec<String> = (0..count).map(spot_label).collect();

    for batch in labels.chunks(INSERT_BATCH_SIZE) {
        let models = batch.iter().map(|label| parking_spot::ActiveModel {
            lot_id: Set(lot_id),
            label: Set(label.clone()),
            status: Set(SpotStatus::Available),
            vehicle_type: Set(DEFAULT_VEHICLE_TYPE.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        });
        ParkingSpot::insert_many(models).exec(conn).await?;
    }

    debug!("Created {} spots for lot {}", labels.len(), lot_id);
    Ok(labels)
}

/// Retrieves a spot by its unique ID.
pub async fn get_spot<C>(conn: &C, spot_id: i64) -> Result<Option<parking_spot::Model>>
where
    C: ConnectionTrait,
{
    ParkingSpot::find_by_id(spot_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists every spot of a lot, ordered by ID.
pub async fn spots_for_lot<C>(conn: &C, lot_id: i64) -> Result<Vec<parking_spot::Model>>
where
    C: ConnectionTrait,
{
    ParkingSpot::find()
        .filter(parking_spot::Column::LotId.eq(lot_id))
        .order_by_asc(parking_spot::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Returns the available spot of a lot with the lowest ID.
///
/// # Errors
/// Returns `NoSpotAvailable` if every spot of the lot is occupied (or the lot has none).
pub async fn find_free_spot<C>(conn: &C, lot_id: i64) -> Result<parking_spot::Model>
where
    C: ConnectionTrait,
{
    ParkingSpot::find()
        .filter(parking_spot::Column::LotId.eq(lot_id))
        .filter(parking_spot::Column::Status.eq(SpotStatus::Available))
        .order_by_asc(parking_spot::Column::Id)
        .one(conn)
        .await?
        .ok_or(Error::NoSpotAvailable { lot_id })
}

/// Flips a spot from available to occupied only if it is still available.
///
/// Returns `false` when another booking claimed the spot first. This is a single
/// conditional `UPDATE`, so two callers can never both win the same spot.
pub async fn try_occupy<C>(conn: &C, spot_id: i64, now: DateTime<Utc>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = ParkingSpot::update_many()
        .set(parking_spot::ActiveModel {
            status: Set(SpotStatus::Occupied),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(parking_spot::Column::Id.eq(spot_id))
        .filter(parking_spot::Column::Status.eq(SpotStatus::Available))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Marks a spot occupied. Already-occupied spots stay occupied.
pub async fn mark_occupied<C>(
    conn: &C,
    spot_id: i64,
    now: DateTime<Utc>,
) -> Result<parking_spot::Model>
where
    C: ConnectionTrait,
{
    set_status(conn, spot_id, SpotStatus::Occupied, now).await
}

/// Marks a spot available. Already-available spots stay available.
pub async fn mark_available<C>(
    conn: &C,
    spot_id: i64,
    now: DateTime<Utc>,
) -> Result<parking_spot::Model>
where
    C: ConnectionTrait,
{
    set_status(conn, spot_id, SpotStatus::Available, now).await
}

async fn set_status<C>(
    conn: &C,
    spot_id: i64,
    status: SpotStatus,
    now: DateTime<Utc>,
) -> Result<parking_spot::Model>
where
    C: ConnectionTrait,
{
    let spot = get_spot(conn, spot_id)
        .await?
        .ok_or(Error::SpotNotFound { spot_id })?;

    let mut active_model: parking_spot::ActiveModel = spot.into();
    active_model.status = Set(status);
    active_model.updated_at = Set(now);
    active_model.update(conn).await.map_err(Into::into)
}

/// Number of available spots in a lot.
pub async fn available_count<C>(conn: &C, lot_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    count_with_status(conn, lot_id, Some(SpotStatus::Available)).await
}

/// Number of occupied spots in a lot.
pub async fn occupied_count<C>(conn: &C, lot_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    count_with_status(conn, lot_id, Some(SpotStatus::Occupied)).await
}

/// Number of spots in a lot, whatever their state.
pub async fn total_count<C>(conn: &C, lot_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    count_with_status(conn, lot_id, None).await
}

async fn count_with_status<C>(conn: &C, lot_id: i64, status: Option<SpotStatus>) -> Result<u64>
where
    C: ConnectionTrait,
{
    let mut query = ParkingSpot::find().filter(parking_spot::Column::LotId.eq(lot_id));
    if let Some(status) = status {
        query = query.filter(parking_spot::Column::Status.eq(status));
    }
    query.count(conn).await.map_err(Into::into)
}
