//! Reservation entity - Binds one user to one spot for a bounded interval.
//!
//! `check_out` and `cost` stay empty while the reservation is active and are
//! written exactly once, when the spot is released.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ReservationStatus {
    /// The user currently occupies the spot
    #[sea_orm(string_value = "active")]
    Active,
    /// Released and billed
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Ended without billing (no code path produces this yet)
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Reservation database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    /// Unique identifier for the reservation
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Spot held by this reservation
    pub spot_id: i64,
    /// User who made the booking
    pub user_id: i64,
    /// Vehicle registration number, if given
    pub vehicle_number: Option<String>,
    /// When the user parked; never changes after creation
    pub check_in: DateTimeUtc,
    /// When the spot was released, `None` while active
    pub check_out: Option<DateTimeUtc>,
    /// Billed amount, `None` while active
    pub cost: Option<f64>,
    /// Lifecycle state
    pub status: ReservationStatus,
    /// When the row was created
    pub created_at: DateTimeUtc,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Reservation and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each reservation holds one spot
    #[sea_orm(
        belongs_to = "super::parking_spot::Entity",
        from = "Column::SpotId",
        to = "super::parking_spot::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Spot,
    /// Each reservation belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::parking_spot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spot.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
