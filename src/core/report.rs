//! Report generation business logic - Lot aggregator and dashboards.
//!
//! Everything here is read-only and recomputed from the spot and reservation
//! tables on every call. Functions return structured data; formatting for a
//! particular surface is left to the caller apart from a few shared helpers.

use crate::{
    core::{
        billing, lot,
        reservation::{self, ReservationDetail},
        spot,
    },
    entities::{
        ParkingLot, ParkingSpot, Reservation, ReservationStatus, User, parking_lot, parking_spot,
        reservation as reservation_entity, user,
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Number of reservations shown in "recent" lists.
pub const RECENT_LIMIT: u64 = 10;

/// Occupancy and revenue of one lot.
#[derive(Debug, Clone, Serialize)]
pub struct LotStatistics {
    /// Lot ID
    pub lot_id: i64,
    /// Lot display name
    pub lot_name: String,
    /// All spots in the lot
    pub total_spots: u64,
    /// Spots bound to an active reservation
    pub occupied_spots: u64,
    /// Spots free to book
    pub available_spots: u64,
    /// Occupied share in percent, two decimals
    pub occupancy_rate: f64,
    /// Sum of completed reservation costs, two decimals
    pub revenue: f64,
}

impl fmt::Display for LotStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} occupied {} | revenue {}",
            self.lot_name,
            self.occupied_spots,
            self.total_spots,
            format_occupancy_bar(self.occupancy_rate, None),
            format_cost(self.revenue)
        )
    }
}

/// A user's completed stays in one lot.
#[derive(Debug, Clone, Serialize)]
pub struct LotUsage {
    /// Lot display name
    pub lot_name: String,
    /// Completed stays
    pub visits: u64,
    /// Hours parked, two decimals
    pub hours: f64,
    /// Amount paid, two decimals
    pub cost: f64,
}

/// A user's parking totals over completed reservations.
#[derive(Debug, Clone, Serialize)]
pub struct UserUsage {
    /// Completed stays
    pub total_bookings: u64,
    /// Hours parked, two decimals
    pub total_hours: f64,
    /// Amount paid, two decimals
    pub total_spent: f64,
    /// Average amount per stay, two decimals
    pub average_cost: f64,
    /// Breakdown per lot, ordered by lot name
    pub by_lot: Vec<LotUsage>,
}

/// Counts and recent activity for the admin overview.
#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    /// Number of lots
    pub total_lots: u64,
    /// Number of spots over all lots
    pub total_spots: u64,
    /// Occupied spots over all lots
    pub occupied_spots: u64,
    /// Free spots over all lots
    pub available_spots: u64,
    /// Regular (non-admin) users
    pub total_users: u64,
    /// Reservations currently active
    pub active_reservations: u64,
    /// Reservations ever made
    pub total_reservations: u64,
    /// Newest reservations, active ones with live duration and cost
    pub recent_reservations: Vec<ReservationDetail>,
}

/// A user's own overview.
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboard {
    /// Active reservations with live duration and running cost
    pub active: Vec<ReservationDetail>,
    /// Newest completed reservations
    pub recent_completed: Vec<ReservationDetail>,
    /// Amount paid over all completed reservations, two decimals
    pub total_spent: f64,
    /// Reservations currently active
    pub active_count: u64,
    /// Reservations ever made
    pub total_count: u64,
}

/// Who is parked on a spot right now.
#[derive(Debug, Clone, Serialize)]
pub struct Occupant {
    /// Active reservation ID
    pub reservation_id: i64,
    /// Booking user's login name
    pub username: String,
    /// Vehicle registration number, if given
    pub vehicle_number: Option<String>,
    /// Check-in time
    pub since: DateTime<Utc>,
    /// Hours parked so far, two decimals
    pub duration_hours: f64,
}

/// One spot and its current occupant.
#[derive(Debug, Clone, Serialize)]
pub struct SpotOccupancy {
    /// The spot
    pub spot: parking_spot::Model,
    /// `None` while the spot is free
    pub occupant: Option<Occupant>,
}

/// Live spot map of a lot.
#[derive(Debug, Clone, Serialize)]
pub struct LotOccupancy {
    /// The lot
    pub lot: parking_lot::Model,
    /// Every spot in ID order
    pub spots: Vec<SpotOccupancy>,
}

/// Calculates the occupied share of a lot in percent.
///
/// Returns 0 for a lot without spots.
#[must_use]
pub fn occupancy_rate(occupied: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    // Cast safety: spot counts are at most a few thousand.
    #[allow(clippy::cast_precision_loss)]
    let rate = occupied as f64 / total as f64 * 100.0;
    billing::round_cents(rate)
}

/// Generates an occupancy bar like `[████████░░] 80.0%`.
#[must_use]
pub fn format_occupancy_bar(rate_percent: f64, bar_length: Option<usize>) -> String {
    let length = bar_length.unwrap_or(10);
    let clamped = rate_percent.clamp(0.0, 100.0);

    // Cast safety: clamped ∈ [0, 100] and length is small, so the result is in [0, length].
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let filled = ((clamped / 100.0) * length as f64).round() as usize;
    let empty = length.saturating_sub(filled);

    format!(
        "[{}{}] {rate_percent:.1}%",
        "█".repeat(filled),
        "░".repeat(empty)
    )
}

/// Formats a money amount like `$25.00`.
#[must_use]
pub fn format_cost(amount: f64) -> String {
    format!("${amount:.2}")
}

/// Sums the costs of completed reservations on a lot's spots.
pub async fn lot_revenue<C>(conn: &C, lot_id: i64) -> Result<f64>
where
    C: ConnectionTrait,
{
    let completed = Reservation::find()
        .inner_join(ParkingSpot)
        .filter(parking_spot::Column::LotId.eq(lot_id))
        .filter(reservation_entity::Column::Status.eq(ReservationStatus::Completed))
        .all(conn)
        .await?;

    let total: f64 = completed.iter().filter_map(|r| r.cost).sum();
    Ok(billing::round_cents(total))
}

/// Occupancy and revenue for every lot, ordered by lot name.
pub async fn lot_statistics(db: &DatabaseConnection) -> Result<Vec<LotStatistics>> {
    let availability = lot::lot_availability(db).await?;
    let mut stats = Vec::with_capacity(availability.len());

    for entry in availability {
        stats.push(LotStatistics {
            occupancy_rate: occupancy_rate(entry.occupied_spots, entry.total_spots),
            revenue: lot_revenue(db, entry.lot.id).await?,
            lot_id: entry.lot.id,
            lot_name: entry.lot.name,
            total_spots: entry.total_spots,
            occupied_spots: entry.occupied_spots,
            available_spots: entry.available_spots,
        });
    }

    Ok(stats)
}

/// Totals and per-lot breakdown of a user's completed reservations.
pub async fn user_usage(db: &DatabaseConnection, user_id: i64) -> Result<UserUsage> {
    let completed = reservation::history(user_id, Some(ReservationStatus::Completed))
        .all(db)
        .await?;
    let details = reservation::describe(db, completed, Utc::now()).await?;

    let mut by_lot: BTreeMap<String, (u64, f64, f64)> = BTreeMap::new();
    for detail in &details {
        let entry = by_lot.entry(detail.lot_name.clone()).or_default();
        entry.0 += 1;
        entry.1 += detail.duration_hours;
        entry.2 += detail.cost;
    }

    let total_bookings = details.len() as u64;
    let total_hours: f64 = details.iter().map(|d| d.duration_hours).sum();
    let total_spent: f64 = details.iter().map(|d| d.cost).sum();
    let average_cost = if total_bookings == 0 {
        0.0
    } else {
        // Cast safety: booking counts are far below 2^53.
        #[allow(clippy::cast_precision_loss)]
        let visits = total_bookings as f64;
        total_spent / visits
    };

    Ok(UserUsage {
        total_bookings,
        total_hours: billing::round_hours(total_hours),
        total_spent: billing::round_cents(total_spent),
        average_cost: billing::round_cents(average_cost),
        by_lot: by_lot
            .into_iter()
            .map(|(lot_name, (visits, hours, cost))| LotUsage {
                lot_name,
                visits,
                hours: billing::round_hours(hours),
                cost: billing::round_cents(cost),
            })
            .collect(),
    })
}

/// System-wide counts and the newest reservations.
pub async fn admin_dashboard(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<AdminDashboard> {
    let total_lots = ParkingLot::find().count(db).await?;
    let total_spots = ParkingSpot::find().count(db).await?;
    let occupied_spots = ParkingSpot::find()
        .filter(parking_spot::Column::Status.eq(crate::entities::SpotStatus::Occupied))
        .count(db)
        .await?;
    let total_users = User::find()
        .filter(user::Column::IsAdmin.eq(false))
        .count(db)
        .await?;
    let active_reservations = Reservation::find()
        .filter(reservation_entity::Column::Status.eq(ReservationStatus::Active))
        .count(db)
        .await?;
    let total_reservations = Reservation::find().count(db).await?;

    let recent = Reservation::find()
        .order_by_desc(reservation_entity::Column::CreatedAt)
        .order_by_desc(reservation_entity::Column::Id)
        .limit(RECENT_LIMIT)
        .all(db)
        .await?;

    Ok(AdminDashboard {
        total_lots,
        total_spots,
        occupied_spots,
        available_spots: total_spots - occupied_spots,
        total_users,
        active_reservations,
        total_reservations,
        recent_reservations: reservation::describe(db, recent, now).await?,
    })
}

/// A user's active stays, recent history and spending.
pub async fn user_dashboard(
    db: &DatabaseConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<UserDashboard> {
    let active = reservation::history(user_id, Some(ReservationStatus::Active))
        .all(db)
        .await?;
    let completed = reservation::history(user_id, Some(ReservationStatus::Completed));
    let recent_completed = completed.recent(db, RECENT_LIMIT).await?;

    let total_spent: f64 = completed
        .all(db)
        .await?
        .iter()
        .filter_map(|r| r.cost)
        .sum();

    Ok(UserDashboard {
        active_count: active.len() as u64,
        total_count: reservation::history(user_id, None).count(db).await?,
        active: reservation::describe(db, active, now).await?,
        recent_completed: reservation::describe(db, recent_completed, now).await?,
        total_spent: billing::round_cents(total_spent),
    })
}

/// Every spot of a lot with whoever is parked on it.
pub async fn lot_occupancy(
    db: &DatabaseConnection,
    lot_id: i64,
    now: DateTime<Utc>,
) -> Result<LotOccupancy> {
    let lot = lot::require_lot(db, lot_id).await?;
    let spots = spot::spots_for_lot(db, lot_id).await?;

    let active: HashMap<i64, reservation_entity::Model> = Reservation::find()
        .inner_join(ParkingSpot)
        .filter(parking_spot::Column::LotId.eq(lot_id))
        .filter(reservation_entity::Column::Status.eq(ReservationStatus::Active))
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.spot_id, r))
        .collect();

    let user_ids: Vec<i64> = active.values().map(|r| r.user_id).collect();
    let usernames: HashMap<i64, String> = User::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    let spots = spots
        .into_iter()
        .map(|spot| {
            let occupant = active.get(&spot.id).map(|r| Occupant {
                reservation_id: r.id,
                username: usernames.get(&r.user_id).cloned().unwrap_or_default(),
                vehicle_number: r.vehicle_number.clone(),
                since: r.check_in,
                duration_hours: billing::round_hours(
                    billing::duration_hours(r.check_in, now).max(0.0),
                ),
            });
            SpotOccupancy { spot, occupant }
        })
        .collect();

    Ok(LotOccupancy { lot, spots })
}
