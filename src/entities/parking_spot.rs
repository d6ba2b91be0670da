//! Parking spot entity - An individually addressable space inside a lot.
//!
//! Labels such as `A-01` are unique within a lot. The `status` column is the
//! single source of truth for occupancy; counts are always derived from it.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Occupancy state of a spot, stored as a one-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(1))")]
pub enum SpotStatus {
    /// Free to be booked
    #[sea_orm(string_value = "A")]
    Available,
    /// Bound to an active reservation
    #[sea_orm(string_value = "O")]
    Occupied,
}

/// Parking spot database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parking_spots")]
pub struct Model {
    /// Unique identifier for the spot
    #[sea_orm(primary_key)]
    pub id: i64,
    /// ID of the lot that owns this spot
    pub lot_id: i64,
    /// Section-sequence label, unique within the lot
    pub label: String,
    /// Current occupancy
    pub status: SpotStatus,
    /// Vehicle class the spot is meant for
    pub vehicle_type: String,
    /// When the spot was created
    pub created_at: DateTimeUtc,
    /// When the spot last changed state
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `ParkingSpot` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each spot belongs to one lot
    #[sea_orm(
        belongs_to = "super::parking_lot::Entity",
        from = "Column::LotId",
        to = "super::parking_lot::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Lot,
    /// One spot has many reservations over time
    #[sea_orm(has_many = "super::reservation::Entity")]
    Reservations,
}

impl Related<super::parking_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lot.def()
    }
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
