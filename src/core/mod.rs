/// Booking and releasing spots
pub mod allocation;

/// Parking cost calculation
pub mod billing;

/// Scheduled reminders, monthly reports and history exports
pub mod jobs;

/// Lot inventory management
pub mod lot;

/// Occupancy, revenue and dashboard aggregation
pub mod report;

/// Reservation ledger and history
pub mod reservation;

/// Spot registry and occupancy state
pub mod spot;

/// User directory and admin bootstrap
pub mod user;
