//! Reservation ledger - Active and historical bookings.
//!
//! A reservation is `active` from check-in until its spot is released, then
//! `completed` with its check-out time and cost filled in. The storage layer
//! holds at most one active reservation per user and per spot (see the partial
//! unique indexes in [`crate::config::database`]).
//!
//! The ledger never touches spot state; pairing a reservation change with the
//! matching spot transition is the job of [`crate::core::allocation`].

use crate::{
    core::billing,
    entities::{
        ParkingLot, ParkingSpot, Reservation, ReservationStatus, User, parking_lot, parking_spot,
        reservation, user,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Paginator, QueryOrder, QuerySelect, Select, SelectModel, Set, SqlErr, prelude::*};
use serde::Serialize;
use std::collections::HashMap;

/// Returns the user's active reservation, if any.
pub async fn active_reservation_for_user<C>(
    conn: &C,
    user_id: i64,
) -> Result<Option<reservation::Model>>
where
    C: ConnectionTrait,
{
    Reservation::find()
        .filter(reservation::Column::UserId.eq(user_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Active))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Returns the active reservation holding a spot, if any.
pub async fn active_reservation_for_spot<C>(
    conn: &C,
    spot_id: i64,
) -> Result<Option<reservation::Model>>
where
    C: ConnectionTrait,
{
    Reservation::find()
        .filter(reservation::Column::SpotId.eq(spot_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Active))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Retrieves a reservation by its unique ID, whatever its status.
pub async fn get_reservation<C>(conn: &C, reservation_id: i64) -> Result<Option<reservation::Model>>
where
    C: ConnectionTrait,
{
    Reservation::find_by_id(reservation_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Inserts a new active reservation.
///
/// The caller must have claimed the spot already. A second active reservation
/// for the same spot is rejected by the database.
///
/// # Errors
/// Returns `UserAlreadyHasActiveReservation` if the user already holds an active
/// reservation, including one committed concurrently that only the storage
/// layer's unique index catches.
pub async fn create<C>(
    conn: &C,
    spot_id: i64,
    user_id: i64,
    vehicle_number: Option<String>,
    check_in: DateTime<Utc>,
) -> Result<reservation::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = active_reservation_for_user(conn, user_id).await? {
        return Err(conflict_error(conn, &existing).await?);
    }

    let vehicle_number = vehicle_number
        .map(|number| number.trim().to_string())
        .filter(|number| !number.is_empty());

    let inserted = reservation::ActiveModel {
        spot_id: Set(spot_id),
        user_id: Set(user_id),
        vehicle_number: Set(vehicle_number),
        check_in: Set(check_in),
        check_out: Set(None),
        cost: Set(None),
        status: Set(ReservationStatus::Active),
        created_at: Set(check_in),
        updated_at: Set(check_in),
        ..Default::default()
    }
    .insert(conn)
    .await;

    match inserted {
        Ok(created) => Ok(created),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            match active_reservation_for_user(conn, user_id).await? {
                Some(existing) => Err(conflict_error(conn, &existing).await?),
                None => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Builds the `UserAlreadyHasActiveReservation` error for an existing active
/// reservation, naming the lot and spot the user is parked in.
pub async fn conflict_error<C>(conn: &C, existing: &reservation::Model) -> Result<Error>
where
    C: ConnectionTrait,
{
    let spot = ParkingSpot::find_by_id(existing.spot_id).one(conn).await?;
    let lot_name = match &spot {
        Some(spot) => ParkingLot::find_by_id(spot.lot_id)
            .one(conn)
            .await?
            .map(|lot| lot.name)
            .unwrap_or_default(),
        None => String::new(),
    };

    Ok(Error::UserAlreadyHasActiveReservation {
        user_id: existing.user_id,
        lot_name,
        spot_label: spot.map(|spot| spot.label).unwrap_or_default(),
    })
}

/// Moves an active reservation to `completed`, recording check-out and cost.
///
/// The status check and the write are one conditional `UPDATE`, so concurrent
/// callers cannot both complete the same reservation.
///
/// # Errors
/// Returns `ReservationNotFound` for an unknown ID and `ReservationNotActive`
/// when the reservation was already completed or cancelled.
pub async fn complete<C>(
    conn: &C,
    reservation_id: i64,
    check_out: DateTime<Utc>,
    cost: f64,
) -> Result<reservation::Model>
where
    C: ConnectionTrait,
{
    let result = Reservation::update_many()
        .set(reservation::ActiveModel {
            status: Set(ReservationStatus::Completed),
            check_out: Set(Some(check_out)),
            cost: Set(Some(cost)),
            updated_at: Set(check_out),
            ..Default::default()
        })
        .filter(reservation::Column::Id.eq(reservation_id))
        .filter(reservation::Column::Status.eq(ReservationStatus::Active))
        .exec(conn)
        .await?;

    let stored = get_reservation(conn, reservation_id)
        .await?
        .ok_or(Error::ReservationNotFound { reservation_id })?;

    if result.rows_affected == 0 {
        return Err(Error::ReservationNotActive { reservation_id });
    }
    Ok(stored)
}

/// A user's reservation history, optionally restricted to one status.
///
/// Building the history runs no query. Each call to [`ReservationHistory::paginate`]
/// starts a fresh pager, so a listing can be restarted or re-read at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationHistory {
    user_id: i64,
    status: Option<ReservationStatus>,
}

/// Describes the history of `user_id`'s reservations.
///
/// Completed history is ordered by check-out time, everything else by creation
/// time; newest first in both cases.
#[must_use]
pub const fn history(user_id: i64, status: Option<ReservationStatus>) -> ReservationHistory {
    ReservationHistory { user_id, status }
}

impl ReservationHistory {
    fn query(&self) -> Select<Reservation> {
        let mut query = Reservation::find().filter(reservation::Column::UserId.eq(self.user_id));
        if let Some(status) = self.status {
            query = query.filter(reservation::Column::Status.eq(status));
        }
        match self.status {
            Some(ReservationStatus::Completed) => query
                .order_by_desc(reservation::Column::CheckOut)
                .order_by_desc(reservation::Column::Id),
            _ => query
                .order_by_desc(reservation::Column::CreatedAt)
                .order_by_desc(reservation::Column::Id),
        }
    }

    /// Pages through the history lazily, `page_size` rows per query.
    pub fn paginate<'db, C>(
        &self,
        conn: &'db C,
        page_size: u64,
    ) -> Paginator<'db, C, SelectModel<reservation::Model>>
    where
        C: ConnectionTrait,
    {
        self.query().paginate(conn, page_size)
    }

    /// Loads the whole history at once.
    pub async fn all<C>(&self, conn: &C) -> Result<Vec<reservation::Model>>
    where
        C: ConnectionTrait,
    {
        self.query().all(conn).await.map_err(Into::into)
    }

    /// Loads the newest `limit` entries.
    pub async fn recent<C>(&self, conn: &C, limit: u64) -> Result<Vec<reservation::Model>>
    where
        C: ConnectionTrait,
    {
        self.query()
            .limit(limit)
            .all(conn)
            .await
            .map_err(Into::into)
    }

    /// Number of entries in the history.
    pub async fn count<C>(&self, conn: &C) -> Result<u64>
    where
        C: ConnectionTrait,
    {
        self.query().count(conn).await.map_err(Into::into)
    }
}

/// A reservation joined with the spot and lot it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationDetail {
    /// The reservation row
    pub reservation: reservation::Model,
    /// Lot the spot belongs to
    pub lot_id: i64,
    /// Lot display name
    pub lot_name: String,
    /// Spot label, e.g. `A-01`
    pub spot_label: String,
    /// Username of the booking user
    pub username: String,
    /// Current hourly rate of the lot
    pub price_per_hour: f64,
    /// Hours parked so far (active) or in total (completed), two decimals
    pub duration_hours: f64,
    /// Stored cost, or the running estimate while active
    pub cost: f64,
}

/// Joins reservations with their spot, lot and user for display.
///
/// Reservations whose spot no longer exists are skipped.
pub async fn describe<C>(
    conn: &C,
    reservations: Vec<reservation::Model>,
    now: DateTime<Utc>,
) -> Result<Vec<ReservationDetail>>
where
    C: ConnectionTrait,
{
    let spot_ids: Vec<i64> = reservations.iter().map(|r| r.spot_id).collect();
    let spots: HashMap<i64, parking_spot::Model> = ParkingSpot::find()
        .filter(parking_spot::Column::Id.is_in(spot_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|spot| (spot.id, spot))
        .collect();

    let lot_ids: Vec<i64> = spots.values().map(|spot| spot.lot_id).collect();
    let lots: HashMap<i64, parking_lot::Model> = ParkingLot::find()
        .filter(parking_lot::Column::Id.is_in(lot_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|lot| (lot.id, lot))
        .collect();

    let user_ids: Vec<i64> = reservations.iter().map(|r| r.user_id).collect();
    let usernames: HashMap<i64, String> = User::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|user| (user.id, user.username))
        .collect();

    let details = reservations
        .into_iter()
        .filter_map(|reservation| {
            let spot = spots.get(&reservation.spot_id)?;
            let lot = lots.get(&spot.lot_id)?;
            let end = reservation.check_out.unwrap_or(now);
            let duration = billing::duration_hours(reservation.check_in, end).max(0.0);
            let cost = reservation.cost.unwrap_or_else(|| {
                billing::running_cost(reservation.check_in, now, lot.price_per_hour)
            });

            Some(ReservationDetail {
                lot_id: lot.id,
                lot_name: lot.name.clone(),
                spot_label: spot.label.clone(),
                username: usernames
                    .get(&reservation.user_id)
                    .cloned()
                    .unwrap_or_default(),
                price_per_hour: lot.price_per_hour,
                duration_hours: billing::round_hours(duration),
                cost,
                reservation,
            })
        })
        .collect();

    Ok(details)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::spot;
    use crate::test_utils::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_lookup_active() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(3).await?;
        let spot = spot::find_free_spot(&db, lot.id).await?;

        let created = create(&db, spot.id, user.id, Some(" KA01AB1234 ".to_string()), start()).await?;
        assert_eq!(created.status, ReservationStatus::Active);
        assert_eq!(created.vehicle_number.as_deref(), Some("KA01AB1234"));
        assert!(created.check_out.is_none());
        assert!(created.cost.is_none());

        let by_user = active_reservation_for_user(&db, user.id).await?.unwrap();
        assert_eq!(by_user.id, created.id);
        let by_spot = active_reservation_for_spot(&db, spot.id).await?.unwrap();
        assert_eq!(by_spot.id, created.id);

        assert!(active_reservation_for_user(&db, user.id + 100).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_blank_vehicle_number_is_dropped() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(1).await?;
        let spot = spot::find_free_spot(&db, lot.id).await?;

        let created = create(&db, spot.id, user.id, Some("   ".to_string()), start()).await?;
        assert!(created.vehicle_number.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_second_active_reservation_rejected() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(3).await?;
        let spots = spot::spots_for_lot(&db, lot.id).await?;

        create(&db, spots[0].id, user.id, None, start()).await?;
        let same_user = create(&db, spots[1].id, user.id, None, start()).await;
        assert!(matches!(
            same_user,
            Err(Error::UserAlreadyHasActiveReservation { ref lot_name, ref spot_label, .. })
                if *lot_name == lot.name && spot_label == "A-01"
        ));

        let other = create_test_user(&db, "other").await?;
        let same_spot = create(&db, spots[0].id, other.id, None, start()).await;
        assert!(matches!(same_spot, Err(Error::Database(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_complete_exactly_once() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(1).await?;
        let spot = spot::find_free_spot(&db, lot.id).await?;
        let created = create(&db, spot.id, user.id, None, start()).await?;

        let check_out = start() + Duration::minutes(90);
        let completed = complete(&db, created.id, check_out, 15.0).await?;
        assert_eq!(completed.status, ReservationStatus::Completed);
        assert_eq!(completed.check_out, Some(check_out));
        assert_eq!(completed.cost, Some(15.0));
        assert_eq!(completed.check_in, created.check_in);

        let again = complete(&db, created.id, check_out + Duration::hours(1), 99.0).await;
        assert!(matches!(again, Err(Error::ReservationNotActive { .. })));

        let stored = get_reservation(&db, created.id).await?.unwrap();
        assert_eq!(stored.cost, Some(15.0));
        assert!(active_reservation_for_user(&db, user.id).await?.is_none());

        let missing = complete(&db, 4242, check_out, 1.0).await;
        assert!(matches!(
            missing,
            Err(Error::ReservationNotFound {
                reservation_id: 4242
            })
        ));

        Ok(())
    }

    /// Books and releases `count` one-hour stays, one per day.
    async fn completed_stays(
        db: &DatabaseConnection,
        spot_id: i64,
        user_id: i64,
        count: i64,
    ) -> Result<Vec<reservation::Model>> {
        let mut stays = Vec::new();
        for day in 0..count {
            let check_in = start() + Duration::days(day);
            let created = create(db, spot_id, user_id, None, check_in).await?;
            stays.push(complete(db, created.id, check_in + Duration::hours(1), 10.0).await?);
        }
        Ok(stays)
    }

    #[tokio::test]
    async fn test_history_newest_first_and_filtered() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(2).await?;
        let spot = spot::find_free_spot(&db, lot.id).await?;

        let stays = completed_stays(&db, spot.id, user.id, 3).await?;
        let active = create(&db, spot.id, user.id, None, start() + Duration::days(10)).await?;

        let everything = history(user.id, None).all(&db).await?;
        assert_eq!(everything.len(), 4);
        assert_eq!(everything[0].id, active.id);

        let completed = history(user.id, Some(ReservationStatus::Completed))
            .all(&db)
            .await?;
        let ids: Vec<i64> = completed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![stays[2].id, stays[1].id, stays[0].id]);

        let only_active = history(user.id, Some(ReservationStatus::Active))
            .all(&db)
            .await?;
        assert_eq!(only_active.len(), 1);

        let recent = history(user.id, None).recent(&db, 2).await?;
        assert_eq!(recent.len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_history_pages_are_restartable() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(1).await?;
        let spot = spot::find_free_spot(&db, lot.id).await?;
        completed_stays(&db, spot.id, user.id, 5).await?;

        let listing = history(user.id, Some(ReservationStatus::Completed));
        assert_eq!(listing.count(&db).await?, 5);

        let mut pages = listing.paginate(&db, 2);
        assert_eq!(pages.num_pages().await?, 3);
        let first = pages.fetch_and_next().await?.unwrap();
        let second = pages.fetch_and_next().await?.unwrap();
        let third = pages.fetch_and_next().await?.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(pages.fetch_and_next().await?.is_none());

        let restarted = listing.paginate(&db, 2).fetch_page(0).await?;
        assert_eq!(
            restarted.iter().map(|r| r.id).collect::<Vec<_>>(),
            first.iter().map(|r| r.id).collect::<Vec<_>>()
        );

        let empty = history(user.id + 1, None).all(&db).await?;
        assert!(empty.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_describe_joins_spot_and_lot() -> Result<()> {
        let (db, lot, user) = setup_with_lot_and_user(2).await?;
        let spots = spot::spots_for_lot(&db, lot.id).await?;

        let done = create(&db, spots[0].id, user.id, None, start()).await?;
        complete(&db, done.id, start() + Duration::minutes(150), 25.0).await?;
        let open = create(&db, spots[1].id, user.id, None, start() + Duration::hours(5)).await?;

        let now = start() + Duration::minutes(5 * 60 + 30);
        let details = describe(&db, history(user.id, None).all(&db).await?, now).await?;
        assert_eq!(details.len(), 2);

        let active = details.iter().find(|d| d.reservation.id == open.id).unwrap();
        assert_eq!(active.lot_name, lot.name);
        assert_eq!(active.spot_label, "A-02");
        assert_eq!(active.username, user.username);
        assert_eq!(active.duration_hours, 0.5);
        assert_eq!(active.cost, 5.0);

        let completed = details.iter().find(|d| d.reservation.id == done.id).unwrap();
        assert_eq!(completed.spot_label, "A-01");
        assert_eq!(completed.duration_hours, 2.5);
        assert_eq!(completed.cost, 25.0);

        Ok(())
    }
}
