//! Parking lot entity - A physical facility with a single hourly rate.
//!
//! A lot owns its spots; deleting the lot removes them. `number_of_spots`
//! records how many spots were generated when the lot was created.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Parking lot database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parking_lots")]
pub struct Model {
    /// Unique identifier for the lot
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Downtown")
    pub name: String,
    /// Hourly rate charged for every spot in the lot
    pub price_per_hour: f64,
    /// Street address
    pub address: String,
    /// Postal pin code
    pub pin_code: String,
    /// Number of spots generated at creation time
    pub number_of_spots: i32,
    /// Free-form description
    pub description: Option<String>,
    /// When the lot was created
    pub created_at: DateTimeUtc,
    /// When the lot was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `ParkingLot` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One lot has many spots
    #[sea_orm(has_many = "super::parking_spot::Entity")]
    Spots,
}

impl Related<super::parking_spot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
