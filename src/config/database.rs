//! Database configuration module.
//!
//! This module handles the `SQLite` connection and schema creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. Constraints that entities cannot
//! express (composite and partial unique indexes) are created with explicit SQL.

use crate::entities::{ParkingLot, ParkingSpot, Reservation, SystemState, User};
use crate::errors::Result;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    RuntimeErr, Schema, TransactionTrait,
};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/parking_buddy.sqlite?mode=rwc";

/// Indexes backing the one-label-per-lot and one-active-reservation rules.
///
/// The two partial indexes make the storage layer reject a second active
/// reservation for the same user or the same spot, even if two transactions
/// pass their application-level checks at the same time.
const INDEX_STATEMENTS: [&str; 3] = [
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_spot_label_per_lot
        ON parking_spots(lot_id, label)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_one_active_reservation_per_user
        ON reservations(user_id)
        WHERE status = 'active'",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_one_active_reservation_per_spot
        ON reservations(spot_id)
        WHERE status = 'active'",
];

/// A write that matches no rows. As the first statement of a transaction it
/// takes the `SQLite` write lock before anything is read.
const WRITE_LOCK_STATEMENT: &str = "UPDATE system_state SET id = id WHERE 0";

/// Primary result code of `SQLITE_BUSY`; extended codes keep it in the low byte.
const SQLITE_BUSY: i32 = 5;

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file (created on first use) if no environment
/// variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Begins a transaction that already holds the write lock.
///
/// `SQLite` starts transactions deferred: one that reads first and writes later
/// cannot upgrade its lock while another connection is writing, and fails with
/// `database is locked` without waiting. Taking the lock with the first
/// statement makes concurrent writers queue on the busy timeout instead, so
/// every read inside the transaction sees the latest committed state.
///
/// # Errors
/// Returns an error if the lock cannot be taken within the busy timeout.
pub async fn begin_write(db: &DatabaseConnection) -> Result<DatabaseTransaction> {
    let txn = db.begin().await?;
    txn.execute_unprepared(WRITE_LOCK_STATEMENT).await?;
    Ok(txn)
}

/// Whether a database error is `SQLite` lock contention (`SQLITE_BUSY`).
#[must_use]
pub fn is_busy(err: &DbErr) -> bool {
    let (DbErr::Conn(RuntimeErr::SqlxError(err))
    | DbErr::Exec(RuntimeErr::SqlxError(err))
    | DbErr::Query(RuntimeErr::SqlxError(err))) = err
    else {
        return false;
    };

    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| code & 0xff == SQLITE_BUSY)
}

/// Creates all tables and indexes if they do not exist yet.
///
/// Parents are created before children so the foreign keys generated from the
/// `belongs_to` relations resolve: users and lots, then spots, then reservations.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table(db, User).await?;
    create_table(db, ParkingLot).await?;
    create_table(db, ParkingSpot).await?;
    create_table(db, Reservation).await?;
    create_table(db, SystemState).await?;

    for statement in INDEX_STATEMENTS {
        db.execute_unprepared(statement).await?;
    }

    info!("Database tables and indexes ensured.");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{
        parking_lot::Model as ParkingLotModel, parking_spot::Model as ParkingSpotModel,
        reservation::Model as ReservationModel, system_state::Model as SystemStateModel,
        user::Model as UserModel,
    };
    use crate::errors::Error;
    use crate::test_utils::{file_db_options, setup_file_db};
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<UserModel> = User::find().limit(1).all(&db).await?;
        let _: Vec<ParkingLotModel> = ParkingLot::find().limit(1).all(&db).await?;
        let _: Vec<ParkingSpotModel> = ParkingSpot::find().limit(1).all(&db).await?;
        let _: Vec<ReservationModel> = Reservation::find().limit(1).all(&db).await?;
        let _: Vec<SystemStateModel> = SystemState::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_begin_write_blocks_other_writers_until_commit() -> Result<()> {
        let (_dir, db) = setup_file_db(2).await?;

        let first = begin_write(&db).await?;
        let waiting = tokio::spawn({
            let db = db.clone();
            async move {
                let second = begin_write(&db).await?;
                second.commit().await?;
                Ok::<_, Error>(())
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!waiting.is_finished(), "second writer should wait for the lock");

        first.commit().await?;
        waiting.await.unwrap()?;

        Ok(())
    }

    #[tokio::test]
    async fn test_is_busy_detects_lock_contention() -> Result<()> {
        let (dir, db) = setup_file_db(1).await?;
        let mut options = file_db_options(&dir, 1);
        options.map_sqlx_sqlite_opts(|opts| opts.busy_timeout(std::time::Duration::ZERO));
        let impatient = Database::connect(options).await?;

        let holder = begin_write(&db).await?;
        let contended = begin_write(&impatient).await;
        assert!(matches!(contended, Err(Error::Database(ref err)) if is_busy(err)));
        holder.commit().await?;

        begin_write(&impatient).await?.commit().await?;
        Ok(())
    }

    #[test]
    fn test_is_busy_ignores_other_errors() {
        assert!(!is_busy(&DbErr::RecordNotFound("spot".to_string())));
        assert!(!is_busy(&DbErr::Custom("database is locked".to_string())));
    }
}
