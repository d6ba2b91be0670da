//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod parking_lot;
pub mod parking_spot;
pub mod reservation;
pub mod system_state;
pub mod user;

// Re-export specific types to avoid conflicts
pub use parking_lot::{Column as ParkingLotColumn, Entity as ParkingLot, Model as ParkingLotModel};
pub use parking_spot::{
    Column as ParkingSpotColumn, Entity as ParkingSpot, Model as ParkingSpotModel, SpotStatus,
};
pub use reservation::{
    Column as ReservationColumn, Entity as Reservation, Model as ReservationModel,
    ReservationStatus,
};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
